use secrecy::SecretString;
use std::time::Duration;
use voxta_types::shared::ClientCapabilities;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
    /// A setting supplied in code rather than through the environment is unusable.
    #[error("Invalid {0}: {1}")]
    InvalidSetting(&'static str, String),
}

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:5384";
pub const DEFAULT_CLIENT_NAME: &str = "voxta-rust-client";
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(30);

/// Holds everything a client needs to reach and authenticate with the service.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// HTTP(S) origin of the service; WebSocket URLs are derived from it.
    pub base_url: String,
    pub access_token: Option<SecretString>,
    pub client_name: String,
    pub client_version: Option<String>,
    pub scope: Vec<String>,
    pub capabilities: ClientCapabilities,
    pub auth_timeout: Duration,
    /// How the session treats a transport's `Reconnecting` signal: when set,
    /// the session waits for `Reconnected`, otherwise it tears down as on a
    /// close. Only transports that restore their own link send that signal;
    /// [`HubTransport`](crate::transport::HubTransport) never does, so with it
    /// every drop ends the session.
    pub reconnect: bool,
    /// Extra headers sent on every WebSocket upgrade (hub and audio input).
    /// `Authorization` is always taken from `access_token` when one is set.
    pub headers: Vec<(String, String)>,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            access_token: None,
            client_name: DEFAULT_CLIENT_NAME.to_string(),
            client_version: None,
            scope: vec!["role:app".to_string()],
            capabilities: ClientCapabilities::default(),
            auth_timeout: DEFAULT_AUTH_TIMEOUT,
            reconnect: true,
            headers: Vec::new(),
        }
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(SecretString::from(token.into()));
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_client(mut self, name: impl Into<String>, version: Option<String>) -> Self {
        self.client_name = name.into();
        self.client_version = version;
        self
    }

    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let base_url = std::env::var("VOXTA_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        if base_url.trim().is_empty() {
            return Err(ConfigError::MissingVar("VOXTA_URL".to_string()));
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::InvalidValue(
                "VOXTA_URL".to_string(),
                format!("'{}' is not an http(s) URL", base_url),
            ));
        }

        let access_token = std::env::var("VOXTA_API_KEY")
            .ok()
            .filter(|token| !token.trim().is_empty())
            .map(SecretString::from);

        let client_name =
            std::env::var("VOXTA_CLIENT").unwrap_or_else(|_| DEFAULT_CLIENT_NAME.to_string());
        if client_name.trim().is_empty() {
            return Err(ConfigError::InvalidValue(
                "VOXTA_CLIENT".to_string(),
                "client name must not be empty".to_string(),
            ));
        }
        let client_version = std::env::var("VOXTA_CLIENT_VERSION").ok();

        let auth_timeout = match std::env::var("VOXTA_AUTH_TIMEOUT_MS") {
            Ok(raw) => raw.parse::<u64>().map(Duration::from_millis).map_err(|_| {
                ConfigError::InvalidValue(
                    "VOXTA_AUTH_TIMEOUT_MS".to_string(),
                    format!("'{}' is not a number of milliseconds", raw),
                )
            })?,
            Err(_) => DEFAULT_AUTH_TIMEOUT,
        };

        let reconnect = match std::env::var("VOXTA_RECONNECT") {
            Ok(raw) => match raw.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::InvalidValue(
                        "VOXTA_RECONNECT".to_string(),
                        format!("'{}' is not a boolean", raw),
                    ));
                }
            },
            Err(_) => true,
        };

        Ok(Self {
            base_url,
            access_token,
            client_name,
            client_version,
            scope: vec!["role:app".to_string()],
            capabilities: ClientCapabilities::default(),
            auth_timeout,
            reconnect,
            headers: Vec::new(),
        })
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serial_test::serial;
    use std::env;

    fn clear_env_vars() {
        unsafe {
            env::remove_var("VOXTA_URL");
            env::remove_var("VOXTA_API_KEY");
            env::remove_var("VOXTA_CLIENT");
            env::remove_var("VOXTA_CLIENT_VERSION");
            env::remove_var("VOXTA_AUTH_TIMEOUT_MS");
            env::remove_var("VOXTA_RECONNECT");
        }
    }

    #[test]
    fn test_config_error_display() {
        let missing_var = ConfigError::MissingVar("TEST_VAR".to_string());
        assert_eq!(
            format!("{}", missing_var),
            "Missing environment variable: TEST_VAR"
        );

        let invalid_value =
            ConfigError::InvalidValue("TEST_VAR".to_string(), "bad_value".to_string());
        assert_eq!(
            format!("{}", invalid_value),
            "Invalid value for environment variable TEST_VAR: bad_value"
        );

        let invalid_setting =
            ConfigError::InvalidSetting("client name", "must not be empty".to_string());
        assert_eq!(
            format!("{}", invalid_setting),
            "Invalid client name: must not be empty"
        );
    }

    #[test]
    #[serial]
    fn test_config_from_env_defaults() {
        clear_env_vars();

        let config = ClientConfig::from_env().expect("Config should load successfully");

        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert!(config.access_token.is_none());
        assert_eq!(config.client_name, DEFAULT_CLIENT_NAME);
        assert_eq!(config.client_version, None);
        assert_eq!(config.scope, vec!["role:app".to_string()]);
        assert_eq!(config.auth_timeout, Duration::from_secs(30));
        assert!(config.reconnect);
    }

    #[test]
    #[serial]
    fn test_config_from_env_custom_values() {
        clear_env_vars();
        unsafe {
            env::set_var("VOXTA_URL", "https://voxta.example.com");
            env::set_var("VOXTA_API_KEY", "secret-key");
            env::set_var("VOXTA_CLIENT", "console-chat");
            env::set_var("VOXTA_CLIENT_VERSION", "0.2.0");
            env::set_var("VOXTA_AUTH_TIMEOUT_MS", "5000");
            env::set_var("VOXTA_RECONNECT", "off");
        }

        let config = ClientConfig::from_env().expect("Config should load successfully");

        assert_eq!(config.base_url, "https://voxta.example.com");
        assert_eq!(
            config.access_token.as_ref().map(|t| t.expose_secret().to_string()),
            Some("secret-key".to_string())
        );
        assert_eq!(config.client_name, "console-chat");
        assert_eq!(config.client_version, Some("0.2.0".to_string()));
        assert_eq!(config.auth_timeout, Duration::from_millis(5000));
        assert!(!config.reconnect);
    }

    #[test]
    #[serial]
    fn test_config_blank_api_key_is_ignored() {
        clear_env_vars();
        unsafe {
            env::set_var("VOXTA_API_KEY", "   ");
        }

        let config = ClientConfig::from_env().expect("Config should load successfully");
        assert!(config.access_token.is_none());
    }

    #[test]
    #[serial]
    fn test_config_invalid_url() {
        clear_env_vars();
        unsafe {
            env::set_var("VOXTA_URL", "ftp://voxta.example.com");
        }

        let err = ClientConfig::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "VOXTA_URL"),
            _ => panic!("Expected InvalidValue for VOXTA_URL"),
        }
    }

    #[test]
    #[serial]
    fn test_config_blank_url_is_missing() {
        clear_env_vars();
        unsafe {
            env::set_var("VOXTA_URL", " ");
        }

        let err = ClientConfig::from_env().unwrap_err();
        match err {
            ConfigError::MissingVar(var) => assert_eq!(var, "VOXTA_URL"),
            _ => panic!("Expected MissingVar for VOXTA_URL"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_timeout() {
        clear_env_vars();
        unsafe {
            env::set_var("VOXTA_AUTH_TIMEOUT_MS", "soon");
        }

        let err = ClientConfig::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "VOXTA_AUTH_TIMEOUT_MS"),
            _ => panic!("Expected InvalidValue for VOXTA_AUTH_TIMEOUT_MS"),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_reconnect_flag() {
        clear_env_vars();
        unsafe {
            env::set_var("VOXTA_RECONNECT", "maybe");
        }

        let err = ClientConfig::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "VOXTA_RECONNECT"),
            _ => panic!("Expected InvalidValue for VOXTA_RECONNECT"),
        }
    }

    #[test]
    #[serial]
    fn test_config_empty_client_name() {
        clear_env_vars();
        unsafe {
            env::set_var("VOXTA_CLIENT", "");
        }

        let err = ClientConfig::from_env().unwrap_err();
        match err {
            ConfigError::InvalidValue(var, msg) => {
                assert_eq!(var, "VOXTA_CLIENT");
                assert!(msg.contains("must not be empty"));
            }
            _ => panic!("Expected InvalidValue for VOXTA_CLIENT"),
        }
    }

    #[test]
    fn test_builder_collects_headers() {
        let config = ClientConfig::new("https://voxta.example.com")
            .with_access_token("key")
            .with_header("X-Voxta-Client", "console")
            .with_header("X-Trace", "1");
        assert_eq!(
            config.headers,
            vec![
                ("X-Voxta-Client".to_string(), "console".to_string()),
                ("X-Trace".to_string(), "1".to_string()),
            ]
        );
        assert!(config.access_token.is_some());
    }
}
