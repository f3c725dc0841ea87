//! Execution modes and environment resolution.

use serde::{Deserialize, Serialize};

/// Execution mode, resolved from `TEST_MODE` before agents are built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Mock,
    Demo,
    Live,
}

impl Mode {
    /// Parses a mode string. Unknown values are a configuration error.
    pub fn parse(s: &str) -> Result<Self, crate::ConfigError> {
        match s.to_ascii_lowercase().as_str() {
            "mock" => Ok(Mode::Mock),
            "demo" => Ok(Mode::Demo),
            "live" => Ok(Mode::Live),
            other => Err(crate::ConfigError::InvalidMode(other.to_string())),
        }
    }

    /// Resolves from the `TEST_MODE` environment variable; unset means mock.
    pub fn from_env() -> Result<Self, crate::ConfigError> {
        match std::env::var("TEST_MODE") {
            Ok(value) if !value.is_empty() => Mode::parse(&value),
            _ => Ok(Mode::Mock),
        }
    }

    /// Whether test-grade base limits apply. Only mock mode runs with the
    /// reduced table; demo exercises the live limits.
    pub fn is_test(&self) -> bool {
        matches!(self, Mode::Mock)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Mock => "mock",
            Mode::Demo => "demo",
            Mode::Live => "live",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_modes() {
        assert_eq!(Mode::parse("mock").unwrap(), Mode::Mock);
        assert_eq!(Mode::parse("DEMO").unwrap(), Mode::Demo);
        assert_eq!(Mode::parse("live").unwrap(), Mode::Live);
    }

    #[test]
    fn rejects_unknown_mode() {
        assert!(Mode::parse("staging").is_err());
    }

    #[test]
    fn only_mock_uses_test_limits() {
        assert!(Mode::Mock.is_test());
        assert!(!Mode::Demo.is_test());
        assert!(!Mode::Live.is_test());
    }
}
