//! Error types for Fley

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Allowance is required before a plan can be generated")]
    MissingAllowance,

    #[error("Expenses ({total_expenses}) exceed or equal allowance ({allowance})")]
    Overspent {
        allowance: Decimal,
        total_expenses: Decimal,
    },

    #[error("Plan provider temporarily unavailable{}: {message}", status_suffix(.status))]
    TransientProvider {
        status: Option<u16>,
        message: String,
    },

    #[error("Plan provider error{}: {message}", status_suffix(.status))]
    Provider {
        status: Option<u16>,
        message: String,
    },

    #[error("Plan provider returned an invalid plan: {0}")]
    InvalidPlanFormat(String),

    #[error("Invalid plan calculation: entertainment ({entertainment}) + savings ({savings}) != remaining ({remaining})")]
    InvalidPlanArithmetic {
        entertainment: Decimal,
        savings: Decimal,
        remaining: Decimal,
    },

    #[error("No profile linked to external id {0}")]
    NotLinked(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Concurrent update conflict: {0}")]
    Conflict(String),

    #[error("Spend would leave a deficit of {0} with no savings to absorb it")]
    UnabsorbedDeficit(Decimal),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether a plan provider call that failed with this error may be retried
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::TransientProvider { .. })
    }

    /// Classify a non-success provider HTTP status
    ///
    /// Rate limiting (429) and unavailability (503) are retryable; everything
    /// else (bad request, auth, quota exhausted) fails immediately.
    pub fn from_provider_status(status: u16, message: String) -> Self {
        match status {
            429 | 503 => Error::TransientProvider {
                status: Some(status),
                message,
            },
            _ => Error::Provider {
                status: Some(status),
                message,
            },
        }
    }

    /// Classify a transport-level failure from the HTTP client
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            Error::TransientProvider {
                status: None,
                message: err.to_string(),
            }
        } else {
            Error::Http(err)
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({})", s)).unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, Error>;
