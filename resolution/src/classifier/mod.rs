//! Error Classifier: merges warehouse logs and profile signals into one
//! [`ErrorClassification`].
//!
//! Evaluation order (first match wins):
//!
//! | Step | Source  | Rule                                                      |
//! |------|---------|-----------------------------------------------------------|
//! | 1    | logs    | fixed pattern table, column by column                     |
//! | 2    | logs    | `<WORD>_ERROR` heuristic, else `GENERAL_ERROR`            |
//! | 3    | profile | error entries: pattern table, then composite keywords;    |
//! |      |         | then cancellation-log messages against the pattern table  |
//! | 4    | profile | `FAILED`/`CANCELLED`/`ERROR` status → `<STATUS>_STATUS`   |
//! | 5    | profile | booking marked invalid → `BOOKING_INVALID`                |
//! | 6    | logs    | records present but silent → `PROVIDER_ERROR`             |
//! | 7    | -       | no classification                                         |
//!
//! Log-derived classifications always beat profile-derived ones. A source
//! that could not be reached contributes no signal; classification only
//! fails when neither source was reachable.

pub mod classification;
pub mod patterns;

pub use classification::{ErrorClassification, ErrorPattern, FailureStatus};

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::model::{BookingProfile, LogColumn, LogRecord};
use patterns::{first_keyword, first_pattern, word_before_error, ERROR_TOKEN};

/// Result of reading one evidence source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSignal<T> {
    /// The source answered (possibly with nothing).
    Available(T),
    /// The source could not be reached; carries the failure description.
    Unavailable(String),
}

impl<T> SourceSignal<T> {
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    pub fn available(&self) -> Option<&T> {
        match self {
            Self::Available(value) => Some(value),
            Self::Unavailable(_) => None,
        }
    }

    pub fn unavailable_reason(&self) -> Option<&str> {
        match self {
            Self::Available(_) => None,
            Self::Unavailable(reason) => Some(reason),
        }
    }
}

/// Everything the classifier gets to look at for one client reference.
#[derive(Debug, Clone)]
pub struct Evidence {
    pub logs: SourceSignal<Vec<LogRecord>>,
    pub profile: SourceSignal<Option<BookingProfile>>,
}

impl Evidence {
    pub fn new(
        logs: SourceSignal<Vec<LogRecord>>,
        profile: SourceSignal<Option<BookingProfile>>,
    ) -> Self {
        Self { logs, profile }
    }

    /// Warehouse records, empty when the warehouse was unreachable.
    pub fn log_records(&self) -> &[LogRecord] {
        self.logs.available().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn profile(&self) -> Option<&BookingProfile> {
        self.profile.available().and_then(Option::as_ref)
    }
}

/// Which rule produced the verdict. Lets the audit trail explain ties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Basis {
    /// Fixed pattern in a log column; `row` is the first row containing it.
    LogPattern { column: LogColumn, row: usize },
    /// Word preceding an `ERROR` token in a log column.
    LogErrorToken { column: LogColumn, row: usize },
    /// `ERROR` token present in a log column with no extractable word.
    LogGeneralError { column: LogColumn },
    /// Fixed pattern in the code or message of a profile error entry.
    ProfileErrorPattern { index: usize },
    /// Composite keyword rule on a profile error message.
    ProfileErrorKeyword { index: usize },
    /// Fixed pattern in a profile cancellation-log message.
    CancellationLog { index: usize },
    /// Failure status on the profile booking.
    ProfileStatus,
    /// Profile service marked the booking invalid.
    ProfileInvalid,
    /// Logs exist but carry no classifiable signal.
    LogsWithoutSignal,
    /// No rule matched.
    NoSignal,
}

/// Classification together with the rule that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub classification: Option<ErrorClassification>,
    pub basis: Basis,
}

impl Verdict {
    fn found(classification: ErrorClassification, basis: Basis) -> Self {
        Self {
            classification: Some(classification),
            basis,
        }
    }

    fn none() -> Self {
        Self {
            classification: None,
            basis: Basis::NoSignal,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClassificationError {
    /// Neither evidence source could be reached.
    #[error("No evidence source reachable (warehouse: {warehouse}; profile: {profile})")]
    NoEvidence { warehouse: String, profile: String },
}

/// Stateless classifier over an [`Evidence`] bundle.
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Produce at most one classification for the evidence.
    pub fn classify(evidence: &Evidence) -> Result<Verdict, ClassificationError> {
        if let (SourceSignal::Unavailable(warehouse), SourceSignal::Unavailable(profile)) =
            (&evidence.logs, &evidence.profile)
        {
            return Err(ClassificationError::NoEvidence {
                warehouse: warehouse.clone(),
                profile: profile.clone(),
            });
        }

        let records = evidence.log_records();
        let verdict = if let Some((classification, basis)) = Self::classify_logs(records) {
            Verdict::found(classification, basis)
        } else if let Some((classification, basis)) =
            evidence.profile().and_then(Self::classify_profile)
        {
            Verdict::found(classification, basis)
        } else if !records.is_empty() {
            Verdict::found(ErrorClassification::ProviderError, Basis::LogsWithoutSignal)
        } else {
            Verdict::none()
        };

        debug!(
            classification = ?verdict.classification,
            basis = ?verdict.basis,
            log_records = records.len(),
            "classified evidence"
        );
        Ok(verdict)
    }

    /// Steps 1–2: scan log columns in order. A column that contains either a
    /// fixed pattern or an `ERROR` token ends the scan.
    pub fn classify_logs(records: &[LogRecord]) -> Option<(ErrorClassification, Basis)> {
        if records.is_empty() {
            return None;
        }

        for column in LogColumn::SCAN_ORDER {
            let texts: Vec<String> = records
                .iter()
                .map(|r| r.text(column).to_uppercase())
                .collect();

            if let Some(pattern) = first_pattern(texts.iter().map(String::as_str)) {
                let row = texts
                    .iter()
                    .position(|t| t.contains(pattern.code()))
                    .unwrap_or(0);
                return Some((pattern.into(), Basis::LogPattern { column, row }));
            }

            if texts.iter().any(|t| t.contains(ERROR_TOKEN)) {
                for (row, text) in texts.iter().enumerate() {
                    if !text.contains(ERROR_TOKEN) {
                        continue;
                    }
                    if let Some(code) = word_before_error(text) {
                        return Some((
                            ErrorClassification::from_code(&code),
                            Basis::LogErrorToken { column, row },
                        ));
                    }
                }
                return Some((
                    ErrorClassification::GeneralError,
                    Basis::LogGeneralError { column },
                ));
            }
        }

        None
    }

    /// Steps 3–5: profile-service signals.
    pub fn classify_profile(profile: &BookingProfile) -> Option<(ErrorClassification, Basis)> {
        for (index, error) in profile.errors.iter().enumerate() {
            let code = error.code.to_uppercase();
            let message = error.message.to_uppercase();

            if let Some(pattern) = first_pattern([message.as_str(), code.as_str()]) {
                return Some((pattern.into(), Basis::ProfileErrorPattern { index }));
            }
            if let Some(pattern) = first_keyword(&message) {
                return Some((pattern.into(), Basis::ProfileErrorKeyword { index }));
            }
        }

        for (index, log) in profile.cancellation_logs.iter().enumerate() {
            let message = log.message.to_uppercase();
            if let Some(pattern) = first_pattern([message.as_str()]) {
                return Some((pattern.into(), Basis::CancellationLog { index }));
            }
        }

        if let Some(status) = FailureStatus::parse(&profile.status) {
            return Some((ErrorClassification::Status(status), Basis::ProfileStatus));
        }

        if !profile.is_valid {
            return Some((ErrorClassification::BookingInvalid, Basis::ProfileInvalid));
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CancellationLog, ProfileError};

    fn log(reason: &str) -> LogRecord {
        LogRecord {
            client_reference: "CR1".into(),
            reason: Some(reason.into()),
            ..Default::default()
        }
    }

    fn profile_with_error(code: &str, message: &str) -> BookingProfile {
        let mut profile = BookingProfile::new("CR1", "confirmed");
        profile.errors.push(ProfileError {
            code: code.into(),
            message: message.into(),
        });
        profile
    }

    fn evidence(logs: Vec<LogRecord>, profile: Option<BookingProfile>) -> Evidence {
        Evidence::new(SourceSignal::Available(logs), SourceSignal::Available(profile))
    }

    #[test]
    fn log_pattern_beats_profile_signal() {
        let ev = evidence(
            vec![log("upstream CONNECTION_ERROR after 3 retries")],
            Some(profile_with_error("TIMEOUT_ERROR", "timeout talking to supplier")),
        );
        let verdict = ErrorClassifier::classify(&ev).unwrap();
        assert_eq!(verdict.classification, Some(ErrorClassification::ConnectionError));
        assert_eq!(
            verdict.basis,
            Basis::LogPattern {
                column: LogColumn::Reason,
                row: 0
            }
        );
    }

    #[test]
    fn word_before_error_fallback() {
        let ev = evidence(vec![log("Foo ERROR occurred")], None);
        let verdict = ErrorClassifier::classify(&ev).unwrap();
        assert_eq!(
            verdict.classification,
            Some(ErrorClassification::Extracted("FOO_ERROR".into()))
        );
    }

    #[test]
    fn extracted_known_code_folds_onto_pattern() {
        let ev = evidence(vec![log("provider error")], None);
        let verdict = ErrorClassifier::classify(&ev).unwrap();
        assert_eq!(verdict.classification, Some(ErrorClassification::ProviderError));
        assert_eq!(
            verdict.basis,
            Basis::LogErrorToken {
                column: LogColumn::Reason,
                row: 0
            }
        );
    }

    #[test]
    fn error_token_without_word_is_general_error() {
        let ev = evidence(vec![log("ERROR: upstream closed")], None);
        let verdict = ErrorClassifier::classify(&ev).unwrap();
        assert_eq!(verdict.classification, Some(ErrorClassification::GeneralError));
    }

    #[test]
    fn earlier_column_error_token_stops_scan() {
        let mut record = log("ERROR");
        record.response = Some("<fault>TIMEOUT_ERROR</fault>".into());
        let verdict = ErrorClassifier::classify(&evidence(vec![record], None)).unwrap();
        assert_eq!(verdict.classification, Some(ErrorClassification::GeneralError));
        assert_eq!(
            verdict.basis,
            Basis::LogGeneralError {
                column: LogColumn::Reason
            }
        );
    }

    #[test]
    fn later_column_scanned_when_earlier_is_silent() {
        let mut record = log("rate updated");
        record.detailed_status = Some("pending".into());
        record.response = Some("{\"code\":\"BOOKING_FAILED\"}".into());
        let verdict = ErrorClassifier::classify(&evidence(vec![record], None)).unwrap();
        assert_eq!(verdict.classification, Some(ErrorClassification::BookingFailed));
        assert_eq!(
            verdict.basis,
            Basis::LogPattern {
                column: LogColumn::Response,
                row: 0
            }
        );
    }

    #[test]
    fn table_order_wins_over_row_order_within_column() {
        let verdict = ErrorClassifier::classify(&evidence(
            vec![log("TIMEOUT_ERROR"), log("SUPPLIER_CONFIRMATION_ERROR")],
            None,
        ))
        .unwrap();
        assert_eq!(
            verdict.classification,
            Some(ErrorClassification::SupplierConfirmationError)
        );
        assert_eq!(
            verdict.basis,
            Basis::LogPattern {
                column: LogColumn::Reason,
                row: 1
            }
        );
    }

    #[test]
    fn first_extractable_row_wins() {
        let verdict = ErrorClassifier::classify(&evidence(
            vec![log("ERROR first"), log("Gateway ERROR"), log("Auth ERROR")],
            None,
        ))
        .unwrap();
        assert_eq!(
            verdict.classification,
            Some(ErrorClassification::Extracted("GATEWAY_ERROR".into()))
        );
    }

    #[test]
    fn profile_error_pattern_in_code() {
        let ev = evidence(vec![], Some(profile_with_error("timeout_error", "")));
        let verdict = ErrorClassifier::classify(&ev).unwrap();
        assert_eq!(verdict.classification, Some(ErrorClassification::TimeoutError));
        assert_eq!(verdict.basis, Basis::ProfileErrorPattern { index: 0 });
    }

    #[test]
    fn profile_composite_keywords() {
        let ev = evidence(
            vec![],
            Some(profile_with_error("E42", "Supplier did not send confirmation")),
        );
        let verdict = ErrorClassifier::classify(&ev).unwrap();
        assert_eq!(
            verdict.classification,
            Some(ErrorClassification::SupplierConfirmationError)
        );
        assert_eq!(verdict.basis, Basis::ProfileErrorKeyword { index: 0 });
    }

    #[test]
    fn first_profile_error_entry_is_not_overridden() {
        let mut profile = profile_with_error("E1", "connection reset by peer");
        profile.errors.push(ProfileError {
            code: "PROVIDER_ERROR".into(),
            message: String::new(),
        });
        let verdict = ErrorClassifier::classify(&evidence(vec![], Some(profile))).unwrap();
        assert_eq!(verdict.classification, Some(ErrorClassification::ConnectionError));
    }

    #[test]
    fn cancellation_logs_checked_after_error_entries() {
        let mut profile = BookingProfile::new("CR1", "failed");
        profile.cancellation_logs.push(CancellationLog {
            message: "cancel rejected: BOOKING_FAILED".into(),
            created_at: None,
        });
        let verdict = ErrorClassifier::classify(&evidence(vec![], Some(profile))).unwrap();
        assert_eq!(verdict.classification, Some(ErrorClassification::BookingFailed));
        assert_eq!(verdict.basis, Basis::CancellationLog { index: 0 });
    }

    #[test]
    fn failure_status_when_nothing_more_specific() {
        let profile = BookingProfile::new("CR1", "Cancelled");
        let verdict = ErrorClassifier::classify(&evidence(vec![], Some(profile))).unwrap();
        assert_eq!(
            verdict.classification,
            Some(ErrorClassification::Status(FailureStatus::Cancelled))
        );
    }

    #[test]
    fn invalid_booking_without_errors() {
        let mut profile = BookingProfile::new("CR1", "confirmed");
        profile.is_valid = false;
        let verdict = ErrorClassifier::classify(&evidence(vec![], Some(profile))).unwrap();
        assert_eq!(verdict.classification, Some(ErrorClassification::BookingInvalid));
        assert_eq!(verdict.basis, Basis::ProfileInvalid);
    }

    #[test]
    fn silent_logs_default_to_provider_error() {
        let mut profile = BookingProfile::new("CR1", "confirmed");
        profile.is_valid = true;
        let verdict =
            ErrorClassifier::classify(&evidence(vec![log("booked ok")], Some(profile))).unwrap();
        assert_eq!(verdict.classification, Some(ErrorClassification::ProviderError));
        assert_eq!(verdict.basis, Basis::LogsWithoutSignal);
    }

    #[test]
    fn invalid_profile_beats_silent_logs() {
        let mut profile = BookingProfile::new("CR1", "confirmed");
        profile.is_valid = false;
        let verdict =
            ErrorClassifier::classify(&evidence(vec![log("booked ok")], Some(profile))).unwrap();
        assert_eq!(verdict.classification, Some(ErrorClassification::BookingInvalid));
    }

    #[test]
    fn no_signal_is_a_valid_outcome() {
        let profile = BookingProfile::new("CR1", "confirmed");
        let verdict = ErrorClassifier::classify(&evidence(vec![], Some(profile))).unwrap();
        assert_eq!(verdict.classification, None);
        assert_eq!(verdict.basis, Basis::NoSignal);
    }

    #[test]
    fn one_unreachable_source_degrades_to_no_signal() {
        let ev = Evidence::new(
            SourceSignal::Unavailable("warehouse down".into()),
            SourceSignal::Available(Some(BookingProfile::new("CR1", "error"))),
        );
        let verdict = ErrorClassifier::classify(&ev).unwrap();
        assert_eq!(
            verdict.classification,
            Some(ErrorClassification::Status(FailureStatus::Error))
        );

        let ev = Evidence::new(
            SourceSignal::Available(vec![log("TIMEOUT_ERROR")]),
            SourceSignal::Unavailable("401".into()),
        );
        let verdict = ErrorClassifier::classify(&ev).unwrap();
        assert_eq!(verdict.classification, Some(ErrorClassification::TimeoutError));
    }

    #[test]
    fn both_sources_unreachable_is_an_error() {
        let ev = Evidence::new(
            SourceSignal::Unavailable("warehouse down".into()),
            SourceSignal::Unavailable("profile down".into()),
        );
        let err = ErrorClassifier::classify(&ev).unwrap_err();
        assert_eq!(
            err,
            ClassificationError::NoEvidence {
                warehouse: "warehouse down".into(),
                profile: "profile down".into(),
            }
        );
    }

    #[test]
    fn reachable_but_empty_sources_are_not_an_error() {
        let verdict = ErrorClassifier::classify(&evidence(vec![], None)).unwrap();
        assert_eq!(verdict.classification, None);
    }
}
