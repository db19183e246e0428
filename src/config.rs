use dotenvy::dotenv;
use std::env;
use std::time::Duration;

use crate::error::AppError;

/// Service configuration, read once at startup.
///
/// Everything has a default so the service boots in development with no
/// environment at all; the identity provider stays optional and its absence
/// downgrades user validation to a warning.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Seconds without a heartbeat before a user counts as offline.
    pub presence_timeout_secs: u64,
    /// Seconds a typing indicator survives without a refresh.
    pub typing_ttl_secs: u64,
    /// Interval of the presence/typing expiry sweeper.
    pub sweep_interval_ms: u64,
    pub identity_service_url: Option<String>,
    pub cors_allowed_origin: Option<String>,
}

impl Config {
    fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, AppError> {
        match env::var(name) {
            Ok(raw) => raw
                .parse::<T>()
                .map_err(|_| AppError::Config(format!("{name} is not a valid value: {raw}"))),
            Err(_) => Ok(default),
        }
    }

    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();

        let port = Self::parse_var("PORT", 8086u16)?;
        let presence_timeout_secs = Self::parse_var("PRESENCE_TIMEOUT_SECS", 30u64)?;
        let typing_ttl_secs = Self::parse_var("TYPING_TTL_SECS", 3u64)?;
        let sweep_interval_ms = Self::parse_var("SWEEP_INTERVAL_MS", 1000u64)?;

        if presence_timeout_secs == 0 || typing_ttl_secs == 0 || sweep_interval_ms == 0 {
            return Err(AppError::Config(
                "presence/typing timers must be non-zero".into(),
            ));
        }

        Ok(Self {
            port,
            presence_timeout_secs,
            typing_ttl_secs,
            sweep_interval_ms,
            identity_service_url: env::var("IDENTITY_SERVICE_URL").ok(),
            cors_allowed_origin: env::var("CORS_ALLOWED_ORIGIN").ok(),
        })
    }

    pub fn presence_timeout(&self) -> Duration {
        Duration::from_secs(self.presence_timeout_secs)
    }

    pub fn typing_ttl(&self) -> Duration {
        Duration::from_secs(self.typing_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_var_rejects_garbage() {
        env::set_var("MESSAGING_TEST_PORT", "not-a-port");
        let result = Config::parse_var::<u16>("MESSAGING_TEST_PORT", 8086);
        env::remove_var("MESSAGING_TEST_PORT");
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_parse_var_falls_back_to_default() {
        assert_eq!(
            Config::parse_var::<u64>("MESSAGING_TEST_UNSET", 30).unwrap(),
            30
        );
    }
}
