use std::path::{Path, PathBuf};

use resolution::DisputeRules;

use crate::error::ConfigError;

pub const DEFAULT_SMARTSHEET_URL: &str = "https://api.smartsheet.com/2.0";
pub const DEFAULT_PROFILE_URL: &str = "https://api.customerprofile.super.com";

/// Variables that must be present for any mode that talks to collaborators.
pub const REQUIRED_VARS: [&str; 5] = [
    "SMARTSHEET_ACCESS_TOKEN",
    "SMARTSHEET_SHEET_ID",
    "SNOWFLAKE_ACCOUNT",
    "SNOWFLAKE_TOKEN",
    "CP_API_KEY",
];

/// Ticket queue (Smartsheet) connection settings.
#[derive(Debug, Clone)]
pub struct SmartsheetConfig {
    pub base_url: String,
    pub access_token: String,
    pub sheet_id: String,
}

/// How the warehouse bearer token was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    OAuth,
    KeypairJwt,
}

impl TokenType {
    /// Value for the `X-Snowflake-Authorization-Token-Type` header.
    pub fn header_value(self) -> &'static str {
        match self {
            Self::OAuth => "OAUTH",
            Self::KeypairJwt => "KEYPAIR_JWT",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "OAUTH" => Some(Self::OAuth),
            "KEYPAIR_JWT" => Some(Self::KeypairJwt),
            _ => None,
        }
    }
}

/// Log warehouse (Snowflake SQL API) settings.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    /// e.g. `https://<account>.snowflakecomputing.com`
    pub base_url: String,
    pub account: String,
    pub token: String,
    pub token_type: TokenType,
    pub warehouse: String,
    pub database: String,
    pub schema: String,
    pub role: Option<String>,
    /// Statement timeout sent to the warehouse, also used as the HTTP timeout.
    pub timeout_secs: u64,
}

/// Booking profile service settings.
#[derive(Debug, Clone)]
pub struct ProfileConfig {
    pub base_url: String,
    pub api_key: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// `LOG_LEVEL`, used when `RUST_LOG` is not set.
    pub level: String,
    /// Plain-text log file; `None` when `LOG_FILE` is set to an empty string.
    pub file: Option<PathBuf>,
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let level = lookup("LOG_LEVEL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "INFO".into());
        let file = match lookup("LOG_FILE") {
            Some(path) if path.trim().is_empty() => None,
            Some(path) => Some(PathBuf::from(path)),
            None => Some(PathBuf::from("dispute_automation.log")),
        };
        Self { level, file }
    }
}

/// Top-level agent configuration, validated at startup.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub smartsheet: SmartsheetConfig,
    pub warehouse: WarehouseConfig,
    pub profile: ProfileConfig,
    pub logging: LoggingConfig,
    /// JSON Lines audit trail.
    pub audit_path: PathBuf,
    /// Directory receiving the per-booking log CSVs.
    pub evidence_dir: PathBuf,
    pub rules: DisputeRules,
    pub rules_path: Option<PathBuf>,
}

impl AgentConfig {
    /// Build from the process environment. `rules_override` wins over
    /// `DISPUTE_RULES_PATH`.
    pub fn from_env(rules_override: Option<&Path>) -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok(), rules_override)
    }

    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        rules_override: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let missing: Vec<String> = REQUIRED_VARS
            .iter()
            .filter(|name| get(**name).is_none())
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::MissingVars(missing));
        }
        let required = |name: &str| get(name).unwrap_or_default();

        let token_type = match get("SNOWFLAKE_TOKEN_TYPE") {
            None => TokenType::OAuth,
            Some(raw) => TokenType::parse(&raw).ok_or_else(|| ConfigError::Invalid {
                name: "SNOWFLAKE_TOKEN_TYPE".into(),
                message: format!("expected OAUTH or KEYPAIR_JWT, got {raw:?}"),
            })?,
        };

        let account = required("SNOWFLAKE_ACCOUNT");
        let warehouse = WarehouseConfig {
            base_url: get("SNOWFLAKE_URL")
                .unwrap_or_else(|| format!("https://{account}.snowflakecomputing.com")),
            account,
            token: required("SNOWFLAKE_TOKEN"),
            token_type,
            warehouse: get("SNOWFLAKE_WAREHOUSE").unwrap_or_else(|| "COMPUTE_WH".into()),
            database: get("SNOWFLAKE_DATABASE").unwrap_or_else(|| "db_apps".into()),
            schema: get("SNOWFLAKE_SCHEMA").unwrap_or_else(|| "public".into()),
            role: get("SNOWFLAKE_ROLE"),
            timeout_secs: parse_secs(get("SNOWFLAKE_TIMEOUT_SECS"), "SNOWFLAKE_TIMEOUT_SECS", 60)?,
        };

        let smartsheet = SmartsheetConfig {
            base_url: get("SMARTSHEET_BASE_URL").unwrap_or_else(|| DEFAULT_SMARTSHEET_URL.into()),
            access_token: required("SMARTSHEET_ACCESS_TOKEN"),
            sheet_id: required("SMARTSHEET_SHEET_ID"),
        };

        let profile = ProfileConfig {
            base_url: get("CP_BASE_URL").unwrap_or_else(|| DEFAULT_PROFILE_URL.into()),
            api_key: required("CP_API_KEY"),
            timeout_secs: parse_secs(get("CP_TIMEOUT_SECS"), "CP_TIMEOUT_SECS", 30)?,
        };

        let rules_path = rules_override
            .map(Path::to_path_buf)
            .or_else(|| get("DISPUTE_RULES_PATH").map(PathBuf::from));
        let rules = match &rules_path {
            Some(path) => DisputeRules::from_file(path)?,
            None => DisputeRules::default(),
        };

        Ok(Self {
            smartsheet,
            warehouse,
            profile,
            logging: LoggingConfig::from_lookup(&lookup),
            audit_path: get("AUDIT_LOG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("audit_log.jsonl")),
            evidence_dir: get("EVIDENCE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("logs")),
            rules,
            rules_path,
        })
    }
}

fn parse_secs(raw: Option<String>, name: &str, default: u64) -> Result<u64, ConfigError> {
    match raw {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .ok_or_else(|| ConfigError::Invalid {
                name: name.into(),
                message: format!("expected a positive number of seconds, got {raw:?}"),
            }),
    }
}
