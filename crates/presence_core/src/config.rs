//! Runtime configuration.
//!
//! # Responsibility
//! - Load service settings from a TOML file.
//! - Resolve the signing key, preferring the environment over the file.
//!
//! # Invariants
//! - The signing key is never part of `Display`/`Debug` output.
//! - Missing optional fields fall back to documented defaults.

use crate::codec::{SigningKey, SigningKeyError};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable that overrides `signing_key` from the file.
pub const SIGNING_KEY_ENV: &str = "PRESENCE_SIGNING_KEY";

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(String),
    MissingSigningKey,
    SigningKey(SigningKeyError),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(message) => write!(f, "failed to parse config: {message}"),
            Self::MissingSigningKey => write!(
                f,
                "no signing key configured; set `signing_key` or {SIGNING_KEY_ENV}"
            ),
            Self::SigningKey(err) => write!(f, "invalid signing key: {err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::SigningKey(err) => Some(err),
            Self::Parse(_) | Self::MissingSigningKey => None,
        }
    }
}

impl From<SigningKeyError> for ConfigError {
    fn from(value: SigningKeyError) -> Self {
        Self::SigningKey(value)
    }
}

/// Service settings.
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PresenceConfig {
    /// SQLite database file shared by every process of one deployment.
    pub database_path: PathBuf,
    /// Hex-encoded HMAC key, at least 32 bytes.
    #[serde(default)]
    pub signing_key: Option<String>,
    /// One of `trace|debug|info|warn|error`; build-mode default when unset.
    #[serde(default)]
    pub log_level: Option<String>,
    /// Absolute directory for rolling log files; stderr when unset.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    /// Seconds after local midnight during which yesterday's code still
    /// scans. Zero means strict.
    #[serde(default)]
    pub scan_grace_seconds: u32,
}

impl PresenceConfig {
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            signing_key: None,
            log_level: None,
            log_dir: None,
            scan_grace_seconds: 0,
        }
    }

    /// Reads and parses a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Resolves the signing key from the process environment or the file.
    pub fn signing_key(&self) -> Result<SigningKey, ConfigError> {
        self.signing_key_with_override(std::env::var(SIGNING_KEY_ENV).ok())
    }

    /// Resolves the signing key, letting `override_hex` win when non-empty.
    pub fn signing_key_with_override(
        &self,
        override_hex: Option<String>,
    ) -> Result<SigningKey, ConfigError> {
        let hex_value = override_hex
            .filter(|value| !value.trim().is_empty())
            .or_else(|| self.signing_key.clone())
            .ok_or(ConfigError::MissingSigningKey)?;
        Ok(SigningKey::from_hex(&hex_value)?)
    }

    pub fn scan_grace(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::from(self.scan_grace_seconds))
    }
}

impl Debug for PresenceConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceConfig")
            .field("database_path", &self.database_path)
            .field("signing_key", &self.signing_key.as_ref().map(|_| "<redacted>"))
            .field("log_level", &self.log_level)
            .field("log_dir", &self.log_dir)
            .field("scan_grace_seconds", &self.scan_grace_seconds)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, PresenceConfig};
    use crate::codec::SigningKeyError;
    use std::io::Write;

    const KEY_HEX: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    #[test]
    fn minimal_config_uses_defaults() {
        let config = PresenceConfig::from_toml_str(r#"database_path = "/var/lib/presence.db""#)
            .unwrap();
        assert_eq!(config.database_path.to_str(), Some("/var/lib/presence.db"));
        assert!(config.signing_key.is_none());
        assert!(config.log_dir.is_none());
        assert_eq!(config.scan_grace_seconds, 0);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = PresenceConfig::from_toml_str(
            "database_path = \"/tmp/p.db\"\nsigning_keys = \"oops\"",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn environment_override_wins_over_file_key() {
        let mut config = PresenceConfig::new("/tmp/p.db");
        config.signing_key = Some("zz".to_string());

        assert!(config
            .signing_key_with_override(Some(KEY_HEX.to_string()))
            .is_ok());
        assert!(matches!(
            config.signing_key_with_override(Some("  ".to_string())),
            Err(ConfigError::SigningKey(SigningKeyError::InvalidHex))
        ));
    }

    #[test]
    fn missing_or_short_key_is_a_config_error() {
        let mut config = PresenceConfig::new("/tmp/p.db");
        assert!(matches!(
            config.signing_key_with_override(None),
            Err(ConfigError::MissingSigningKey)
        ));

        config.signing_key = Some("abcd".to_string());
        assert!(matches!(
            config.signing_key_with_override(None),
            Err(ConfigError::SigningKey(SigningKeyError::TooShort { len: 2 }))
        ));
    }

    #[test]
    fn debug_output_redacts_the_key() {
        let mut config = PresenceConfig::new("/tmp/p.db");
        config.signing_key = Some(KEY_HEX.to_string());
        assert!(!format!("{config:?}").contains(KEY_HEX));
    }

    #[test]
    fn load_reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("presence.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "database_path = \"/tmp/p.db\"\nsigning_key = \"{KEY_HEX}\"\nscan_grace_seconds = 120"
        )
        .unwrap();

        let config = PresenceConfig::load(&path).unwrap();
        assert_eq!(config.scan_grace(), chrono::Duration::minutes(2));
        assert!(config.signing_key_with_override(None).is_ok());

        let missing = PresenceConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }
}
