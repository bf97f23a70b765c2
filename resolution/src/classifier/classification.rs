//! Classification values produced by the error classifier.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// The fixed error patterns, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorPattern {
    SupplierConfirmation,
    Connection,
    Timeout,
    Provider,
    BookingFailed,
}

impl ErrorPattern {
    /// Table order is priority order.
    pub const TABLE: [ErrorPattern; 5] = [
        Self::SupplierConfirmation,
        Self::Connection,
        Self::Timeout,
        Self::Provider,
        Self::BookingFailed,
    ];

    /// Upper-case literal searched for in source text.
    pub fn code(self) -> &'static str {
        match self {
            Self::SupplierConfirmation => "SUPPLIER_CONFIRMATION_ERROR",
            Self::Connection => "CONNECTION_ERROR",
            Self::Timeout => "TIMEOUT_ERROR",
            Self::Provider => "PROVIDER_ERROR",
            Self::BookingFailed => "BOOKING_FAILED",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::TABLE.into_iter().find(|p| p.code() == code)
    }
}

impl fmt::Display for ErrorPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Profile booking statuses that count as a failure signal on their own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureStatus {
    Failed,
    Cancelled,
    Error,
}

impl FailureStatus {
    pub fn parse(status: &str) -> Option<Self> {
        match status.trim().to_uppercase().as_str() {
            "FAILED" => Some(Self::Failed),
            "CANCELLED" => Some(Self::Cancelled),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
            Self::Error => "ERROR",
        }
    }
}

/// The single authoritative failure classification for a booking.
///
/// Serialized as its code string (`"CONNECTION_ERROR"`, `"FAILED_STATUS"`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorClassification {
    SupplierConfirmationError,
    ConnectionError,
    TimeoutError,
    ProviderError,
    BookingFailed,
    /// `ERROR` token present in logs but no word could be extracted.
    GeneralError,
    /// Profile service marked an otherwise error-free booking invalid.
    BookingInvalid,
    /// Profile booking status itself is a failure (`<STATUS>_STATUS`).
    Status(FailureStatus),
    /// `<WORD>_ERROR` extracted from free text, not one of the fixed patterns.
    Extracted(String),
}

impl ErrorClassification {
    /// Build a classification from its code, folding known codes back onto
    /// their dedicated variants.
    pub fn from_code(code: &str) -> Self {
        let code = code.trim().to_uppercase();
        if let Some(pattern) = ErrorPattern::from_code(&code) {
            return pattern.into();
        }
        match code.as_str() {
            "GENERAL_ERROR" => Self::GeneralError,
            "BOOKING_INVALID" => Self::BookingInvalid,
            "FAILED_STATUS" => Self::Status(FailureStatus::Failed),
            "CANCELLED_STATUS" => Self::Status(FailureStatus::Cancelled),
            "ERROR_STATUS" => Self::Status(FailureStatus::Error),
            _ => Self::Extracted(code),
        }
    }

    pub fn code(&self) -> String {
        match self {
            Self::SupplierConfirmationError => ErrorPattern::SupplierConfirmation.code().into(),
            Self::ConnectionError => ErrorPattern::Connection.code().into(),
            Self::TimeoutError => ErrorPattern::Timeout.code().into(),
            Self::ProviderError => ErrorPattern::Provider.code().into(),
            Self::BookingFailed => ErrorPattern::BookingFailed.code().into(),
            Self::GeneralError => "GENERAL_ERROR".into(),
            Self::BookingInvalid => "BOOKING_INVALID".into(),
            Self::Status(status) => format!("{}_STATUS", status.as_str()),
            Self::Extracted(code) => code.clone(),
        }
    }
}

impl From<ErrorPattern> for ErrorClassification {
    fn from(pattern: ErrorPattern) -> Self {
        match pattern {
            ErrorPattern::SupplierConfirmation => Self::SupplierConfirmationError,
            ErrorPattern::Connection => Self::ConnectionError,
            ErrorPattern::Timeout => Self::TimeoutError,
            ErrorPattern::Provider => Self::ProviderError,
            ErrorPattern::BookingFailed => Self::BookingFailed,
        }
    }
}

impl fmt::Display for ErrorClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code())
    }
}

impl Serialize for ErrorClassification {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.code())
    }
}

impl<'de> Deserialize<'de> for ErrorClassification {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let code = String::deserialize(deserializer)?;
        Ok(Self::from_code(&code))
    }
}
