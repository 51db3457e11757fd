use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::env;

#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    pub api_key: Secret<String>,
    pub secret_key: Secret<String>,
    pub passphrase: Secret<String>,
    /// Target the exchange's simulated-trading environment
    pub simulated: bool,
    pub base_url: Option<String>,
    /// HTTP(S) proxy applied to REST traffic
    pub proxy: Option<String>,
}

// Custom Serialize implementation - never expose secrets in serialization
impl Serialize for ExchangeConfig {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("ExchangeConfig", 6)?;
        state.serialize_field("api_key", "[REDACTED]")?;
        state.serialize_field("secret_key", "[REDACTED]")?;
        state.serialize_field("passphrase", "[REDACTED]")?;
        state.serialize_field("simulated", &self.simulated)?;
        state.serialize_field("base_url", &self.base_url)?;
        state.serialize_field("proxy", &self.proxy)?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for ExchangeConfig {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct ExchangeConfigHelper {
            api_key: String,
            secret_key: String,
            #[serde(default)]
            passphrase: String,
            #[serde(default)]
            simulated: bool,
            base_url: Option<String>,
            proxy: Option<String>,
        }

        let helper = ExchangeConfigHelper::deserialize(deserializer)?;
        Ok(Self {
            api_key: Secret::new(helper.api_key),
            secret_key: Secret::new(helper.secret_key),
            passphrase: Secret::new(helper.passphrase),
            simulated: helper.simulated,
            base_url: helper.base_url,
            proxy: helper.proxy,
        })
    }
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self::read_only()
    }
}

impl ExchangeConfig {
    /// Create a new configuration with API credentials
    #[must_use]
    pub fn new(api_key: String, secret_key: String, passphrase: String) -> Self {
        Self {
            api_key: Secret::new(api_key),
            secret_key: Secret::new(secret_key),
            passphrase: Secret::new(passphrase),
            simulated: false,
            base_url: None,
            proxy: None,
        }
    }

    /// Create configuration from environment variables
    ///
    /// Expected environment variables:
    /// - `{EXCHANGE}_API_KEY` (e.g., `OKX_API_KEY`)
    /// - `{EXCHANGE}_SECRET_KEY`
    /// - `{EXCHANGE}_PASSPHRASE`
    /// - `{EXCHANGE}_SIMULATED` (optional, defaults to false)
    /// - `{EXCHANGE}_BASE_URL` (optional)
    /// - `{EXCHANGE}_PROXY` (optional)
    pub fn from_env(exchange_prefix: &str) -> Result<Self, ConfigError> {
        let prefix = exchange_prefix.to_uppercase();
        let api_key_var = format!("{}_API_KEY", prefix);
        let secret_key_var = format!("{}_SECRET_KEY", prefix);
        let passphrase_var = format!("{}_PASSPHRASE", prefix);

        let api_key = env::var(&api_key_var)
            .map_err(|_| ConfigError::MissingEnvironmentVariable(api_key_var))?;

        let secret_key = env::var(&secret_key_var)
            .map_err(|_| ConfigError::MissingEnvironmentVariable(secret_key_var))?;

        let passphrase = env::var(&passphrase_var)
            .map_err(|_| ConfigError::MissingEnvironmentVariable(passphrase_var))?;

        let simulated_var = format!("{}_SIMULATED", prefix);
        let simulated = match env::var(&simulated_var) {
            Ok(raw) => parse_flag(&raw).ok_or_else(|| {
                ConfigError::InvalidConfiguration(format!(
                    "{} must be a boolean, got '{}'",
                    simulated_var, raw
                ))
            })?,
            Err(_) => false,
        };

        Ok(Self {
            api_key: Secret::new(api_key),
            secret_key: Secret::new(secret_key),
            passphrase: Secret::new(passphrase),
            simulated,
            base_url: env::var(format!("{}_BASE_URL", prefix)).ok(),
            proxy: env::var(format!("{}_PROXY", prefix)).ok(),
        })
    }

    /// Create configuration from .env file and environment variables
    ///
    /// **Security Warning**: Never commit .env files to version control!
    #[cfg(feature = "env-file")]
    pub fn from_env_file(exchange_prefix: &str) -> Result<Self, ConfigError> {
        Self::from_env_file_with_path(exchange_prefix, ".env")
    }

    /// Create configuration from a specific .env file path
    ///
    /// A missing file is not an error; system environment variables are used instead.
    #[cfg(feature = "env-file")]
    pub fn from_env_file_with_path(
        exchange_prefix: &str,
        env_file_path: &str,
    ) -> Result<Self, ConfigError> {
        match dotenv::from_path(env_file_path) {
            Ok(()) => {}
            Err(dotenv::Error::Io(io_err)) if io_err.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(ConfigError::InvalidConfiguration(format!(
                    "Failed to load .env file '{}': {}",
                    env_file_path, e
                )));
            }
        }

        Self::from_env(exchange_prefix)
    }

    /// Configuration for public endpoints and public streams only
    #[must_use]
    pub fn read_only() -> Self {
        Self::new(String::new(), String::new(), String::new())
    }

    /// Check if this configuration has a full credential triple
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.api_key.expose_secret().is_empty()
            && !self.secret_key.expose_secret().is_empty()
            && !self.passphrase.expose_secret().is_empty()
    }

    /// Set simulated-trading mode
    #[must_use]
    pub const fn simulated(mut self, simulated: bool) -> Self {
        self.simulated = simulated;
        self
    }

    /// Set custom base URL
    #[must_use]
    pub fn base_url(mut self, base_url: String) -> Self {
        self.base_url = Some(base_url);
        self
    }

    #[must_use]
    pub fn proxy(mut self, proxy: String) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Get API key (use carefully - exposes secret)
    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }

    /// Get secret key (use carefully - exposes secret)
    pub fn secret_key(&self) -> &str {
        self.secret_key.expose_secret()
    }

    /// Get passphrase (use carefully - exposes secret)
    pub fn passphrase(&self) -> &str {
        self.passphrase.expose_secret()
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvironmentVariable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}
