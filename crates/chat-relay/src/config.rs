//! Relay configuration.
//!
//! Configuration is loaded from environment variables. The Redis URL may
//! embed a password, so it is held as a `SecretString` and redacted in
//! Debug output.

use axum::http::HeaderName;
use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Default HTTP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default Redis hash holding `ActiveSession` records.
pub const DEFAULT_PRESENCE_KEY: &str = "minichat:active_sessions";

/// Default bound on a single presence store call, in milliseconds.
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 2000;

/// Default bound on a single per-recipient send, in milliseconds.
pub const DEFAULT_SEND_TIMEOUT_MS: u64 = 2000;

/// Default external login redirect.
pub const DEFAULT_LOGIN_URL: &str = "/_ah/login?continue=/";

/// Default header carrying the authenticated identity.
pub const DEFAULT_IDENTITY_HEADER: &str = "x-authenticated-user";

/// Default lifetime of a provisioned but unopened channel token.
pub const DEFAULT_CHANNEL_TOKEN_TTL_SECONDS: u64 = 7200;

/// Default number of payloads queued per open channel.
pub const DEFAULT_CHANNEL_BUFFER: usize = 64;

/// Default request body limit for posted messages.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 64 * 1024;

/// Default timeout for non-streaming requests.
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;

/// Where `ActiveSession` records live.
#[derive(Clone)]
pub enum PresenceBackend {
    /// Process-local registry (development and tests).
    Memory,
    /// Redis hash at `key`.
    Redis { url: SecretString, key: String },
}

impl PresenceBackend {
    /// Short name for log fields.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceBackend::Memory => "memory",
            PresenceBackend::Redis { .. } => "redis",
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Relay configuration.
#[derive(Clone)]
pub struct Config {
    /// HTTP bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Presence registry backend. Redis when `REDIS_URL` is set.
    pub presence_backend: PresenceBackend,

    /// Bound on each presence store call.
    pub store_timeout: Duration,

    /// Bound on each per-recipient send during fanout.
    pub send_timeout: Duration,

    /// Where anonymous visitors are redirected.
    pub login_url: String,

    /// Header set by the authenticating proxy.
    pub identity_header: String,

    /// Lifetime of a provisioned channel token until it is opened.
    pub channel_token_ttl: Duration,

    /// Payloads queued per open channel before sends start failing.
    pub channel_buffer: usize,

    /// Maximum accepted message body size in bytes.
    pub max_message_bytes: usize,

    /// Timeout for non-streaming requests.
    pub request_timeout: Duration,

    /// Log output format.
    pub log_format: LogFormat,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let presence_key = match &self.presence_backend {
            PresenceBackend::Memory => None,
            PresenceBackend::Redis { key, .. } => Some(key.as_str()),
        };

        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("presence_backend", &self.presence_backend.as_str())
            .field("presence_key", &presence_key)
            .field("redis_url", &"[REDACTED]")
            .field("store_timeout", &self.store_timeout)
            .field("send_timeout", &self.send_timeout)
            .field("login_url", &self.login_url)
            .field("identity_header", &self.identity_header)
            .field("channel_token_ttl", &self.channel_token_ttl)
            .field("channel_buffer", &self.channel_buffer)
            .field("max_message_bytes", &self.max_message_bytes)
            .field("request_timeout", &self.request_timeout)
            .field("log_format", &self.log_format)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("RELAY_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let presence_backend = match vars.get("REDIS_URL").filter(|url| !url.trim().is_empty()) {
            Some(url) => PresenceBackend::Redis {
                url: SecretString::from(url.clone()),
                key: vars
                    .get("RELAY_PRESENCE_KEY")
                    .cloned()
                    .unwrap_or_else(|| DEFAULT_PRESENCE_KEY.to_string()),
            },
            None => PresenceBackend::Memory,
        };

        let store_timeout = Duration::from_millis(parse_positive(
            vars,
            "RELAY_STORE_TIMEOUT_MS",
            DEFAULT_STORE_TIMEOUT_MS,
        )?);

        let send_timeout = Duration::from_millis(parse_positive(
            vars,
            "RELAY_SEND_TIMEOUT_MS",
            DEFAULT_SEND_TIMEOUT_MS,
        )?);

        let login_url = vars
            .get("RELAY_LOGIN_URL")
            .cloned()
            .unwrap_or_else(|| DEFAULT_LOGIN_URL.to_string());
        if login_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "RELAY_LOGIN_URL must not be empty".to_string(),
            ));
        }

        let identity_header = vars
            .get("RELAY_IDENTITY_HEADER")
            .map(|h| h.trim().to_ascii_lowercase())
            .unwrap_or_else(|| DEFAULT_IDENTITY_HEADER.to_string());
        if identity_header.is_empty() {
            return Err(ConfigError::InvalidValue(
                "RELAY_IDENTITY_HEADER must not be empty".to_string(),
            ));
        }
        if HeaderName::from_bytes(identity_header.as_bytes()).is_err() {
            return Err(ConfigError::InvalidValue(format!(
                "RELAY_IDENTITY_HEADER must be a valid header name, got '{identity_header}'"
            )));
        }

        let channel_token_ttl = Duration::from_secs(parse_positive(
            vars,
            "RELAY_CHANNEL_TOKEN_TTL_SECONDS",
            DEFAULT_CHANNEL_TOKEN_TTL_SECONDS,
        )?);

        let channel_buffer = parse_positive(vars, "RELAY_CHANNEL_BUFFER", DEFAULT_CHANNEL_BUFFER)?;

        let max_message_bytes =
            parse_positive(vars, "RELAY_MAX_MESSAGE_BYTES", DEFAULT_MAX_MESSAGE_BYTES)?;

        let request_timeout = Duration::from_secs(parse_positive(
            vars,
            "RELAY_REQUEST_TIMEOUT_SECONDS",
            DEFAULT_REQUEST_TIMEOUT_SECONDS,
        )?);

        let log_format = match vars.get("RELAY_LOG_FORMAT").map(String::as_str) {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::InvalidValue(format!(
                    "RELAY_LOG_FORMAT must be 'pretty' or 'json', got '{other}'"
                )))
            }
        };

        Ok(Config {
            bind_address,
            presence_backend,
            store_timeout,
            send_timeout,
            login_url,
            identity_header,
            channel_token_ttl,
            channel_buffer,
            max_message_bytes,
            request_timeout,
            log_format,
        })
    }
}

/// Parse an optional numeric variable that must be greater than zero.
fn parse_positive<T>(vars: &HashMap<String, String>, name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialEq + Default,
{
    let Some(raw) = vars.get(name) else {
        return Ok(default);
    };

    let value: T = raw.trim().parse().map_err(|_| {
        ConfigError::InvalidValue(format!("{name} must be a positive integer, got '{raw}'"))
    })?;

    if value == T::default() {
        return Err(ConfigError::InvalidValue(format!(
            "{name} must be greater than zero"
        )));
    }

    Ok(value)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use common::secret::ExposeSecret;

    #[test]
    fn test_defaults_use_memory_backend() {
        let config = Config::from_vars(&HashMap::new()).unwrap();

        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert!(matches!(config.presence_backend, PresenceBackend::Memory));
        assert_eq!(config.store_timeout, Duration::from_millis(2000));
        assert_eq!(config.send_timeout, Duration::from_millis(2000));
        assert_eq!(config.login_url, DEFAULT_LOGIN_URL);
        assert_eq!(config.identity_header, DEFAULT_IDENTITY_HEADER);
        assert_eq!(config.channel_token_ttl, Duration::from_secs(7200));
        assert_eq!(config.channel_buffer, 64);
        assert_eq!(config.max_message_bytes, 65536);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_redis_backend_when_url_set() {
        let vars = HashMap::from([
            (
                "REDIS_URL".to_string(),
                "redis://:pw@cache:6379".to_string(),
            ),
            ("RELAY_PRESENCE_KEY".to_string(), "chat:online".to_string()),
        ]);
        let config = Config::from_vars(&vars).unwrap();

        let PresenceBackend::Redis { url, key } = config.presence_backend else {
            unreachable!("expected redis backend");
        };
        assert_eq!(url.expose_secret(), "redis://:pw@cache:6379");
        assert_eq!(key, "chat:online");
    }

    #[test]
    fn test_blank_redis_url_falls_back_to_memory() {
        let vars = HashMap::from([("REDIS_URL".to_string(), "  ".to_string())]);
        let config = Config::from_vars(&vars).unwrap();
        assert!(matches!(config.presence_backend, PresenceBackend::Memory));
    }

    #[test]
    fn test_debug_redacts_redis_url() {
        let vars = HashMap::from([(
            "REDIS_URL".to_string(),
            "redis://:supersecret@cache:6379".to_string(),
        )]);
        let config = Config::from_vars(&vars).unwrap();
        let debug = format!("{config:?}");

        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("supersecret"));
        assert!(debug.contains("minichat:active_sessions"));
    }

    #[test]
    fn test_custom_values() {
        let vars = HashMap::from([
            ("RELAY_BIND_ADDRESS".to_string(), "127.0.0.1:9000".to_string()),
            ("RELAY_SEND_TIMEOUT_MS".to_string(), "250".to_string()),
            ("RELAY_IDENTITY_HEADER".to_string(), "X-Forwarded-User".to_string()),
            ("RELAY_CHANNEL_BUFFER".to_string(), "8".to_string()),
            ("RELAY_LOG_FORMAT".to_string(), "json".to_string()),
        ]);
        let config = Config::from_vars(&vars).unwrap();

        assert_eq!(config.bind_address, "127.0.0.1:9000");
        assert_eq!(config.send_timeout, Duration::from_millis(250));
        assert_eq!(config.identity_header, "x-forwarded-user");
        assert_eq!(config.channel_buffer, 8);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let vars = HashMap::from([("RELAY_STORE_TIMEOUT_MS".to_string(), "0".to_string())]);
        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidValue(msg)) if msg.contains("greater than zero")));
    }

    #[test]
    fn test_unparsable_number_rejected() {
        let vars = HashMap::from([("RELAY_CHANNEL_BUFFER".to_string(), "lots".to_string())]);
        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidValue(msg)) if msg.contains("RELAY_CHANNEL_BUFFER")));
    }

    #[test]
    fn test_empty_login_url_rejected() {
        let vars = HashMap::from([("RELAY_LOGIN_URL".to_string(), String::new())]);
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_invalid_identity_header_rejected() {
        for bad in ["x user", "x-user:", "   "] {
            let vars = HashMap::from([("RELAY_IDENTITY_HEADER".to_string(), bad.to_string())]);
            assert!(
                matches!(Config::from_vars(&vars), Err(ConfigError::InvalidValue(msg)) if msg.contains("RELAY_IDENTITY_HEADER")),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_unknown_log_format_rejected() {
        let vars = HashMap::from([("RELAY_LOG_FORMAT".to_string(), "xml".to_string())]);
        assert!(matches!(
            Config::from_vars(&vars),
            Err(ConfigError::InvalidValue(_))
        ));
    }
}
