use thiserror::Error;

/// Startup and wiring errors. Anything raised inside a poll cycle is one of
/// the narrower types below and never reaches this level.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Notifier setup error: {0}")]
    Notify(#[from] NotifyError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Token acquisition failures.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("token endpoint returned {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("token response has no access_token: {body}")]
    MissingToken { body: String },
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("timeout while contacting the telemetry API")]
    Timeout,

    #[error("connection error with the telemetry API: {0}")]
    Connection(String),

    #[error("HTTP error: {status} {body}")]
    HttpStatus { status: u16, body: String },

    #[error("unknown error contacting the telemetry API: {0}")]
    Unknown(String),
}

impl FetchError {
    /// Every failure class is worth another attempt: tokens are refetched
    /// per attempt and upstream outages are usually transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Auth(_)
            | FetchError::Timeout
            | FetchError::Connection(_)
            | FetchError::HttpStatus { .. }
            | FetchError::Unknown(_) => true,
        }
    }

    /// Upstream status code, when there is one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            FetchError::HttpStatus { status, .. } => Some(*status),
            FetchError::Auth(AuthError::Rejected { status, .. }) => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_connect() {
            FetchError::Connection(err.to_string())
        } else {
            FetchError::Unknown(err.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("record is not a JSON object: {0}")]
    NotAnObject(String),

    #[error("record is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("last_value {0} cannot be converted to a number")]
    InvalidValue(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("invalid mail address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error("failed to build message: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("SMTP error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}
