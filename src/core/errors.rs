use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("API error: {code} - {message}")]
    ApiError { code: i32, message: String },

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Connection timeout: {0}")]
    ConnectionTimeout(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::core::config::ConfigError),

    #[error("Not connected: {0}")]
    NotConnected(String),

    #[error("Reconnection failed after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    #[error("Connection is shutting down")]
    Shutdown,
}

impl ExchangeError {
    /// Whether a failed attempt may be repeated.
    ///
    /// Only transport failures and rate-limit rejections qualify. Everything
    /// the exchange answered deliberately (bad parameters, bad credentials,
    /// business error codes) is surfaced on the first occurrence.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::NetworkError(_)
            | Self::ConnectionTimeout(_)
            | Self::ServerError(_)
            | Self::RateLimitExceeded(_) => true,
            _ => false,
        }
    }

    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Self::RateLimitExceeded(_))
    }
}
