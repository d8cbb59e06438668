//! Connector configuration.
//!
//! Hosts usually hold the connection parameters as flat key/value settings.
//! Recognized keys:
//!
//! | Key | Field | Format |
//! |---|---|---|
//! | `WsIdentifier` | `identifier` | text |
//! | `WsEncryptionKey` | `encryption_key` | text |
//! | `WsHost` | `host` | URL |
//! | `WsCrypt` | `cipher` | `AES-256-CBC` or `AES-128-CBC` |
//! | `WsEncode` | `encoding` | `XML` or `NATIVE` |
//! | `WsTimeout` | `timeout` | seconds |
//! | `WsPostCommit` | `post_commit` | flag |
//! | `SmartNotify` | `smart_notify` | flag |
//! | `WsDebug` | `debug` | flag |
//! | `WsCiBypass` | `ci_bypass` | flag |
//!
//! Flags accept `1`/`0`, `true`/`false`, `yes`/`no` and `on`/`off`. Unknown
//! keys are ignored.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use syncbridge_core::CipherKind;

use crate::error::{Result, WireError};

/// Default transport timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Serialization format of envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    /// Typed XML tree.
    #[default]
    Xml,
    /// JSON document.
    Native,
}

impl FromStr for Encoding {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "XML" => Ok(Encoding::Xml),
            "NATIVE" | "JSON" => Ok(Encoding::Native),
            other => Err(WireError::Config(format!("unknown encoding: {}", other))),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Encoding::Xml => "XML",
            Encoding::Native => "NATIVE",
        })
    }
}

/// Connection and behavior settings of one connector installation.
#[derive(Clone, PartialEq)]
pub struct ConnectorConfig {
    /// Connector identifier, shared with the server.
    pub identifier: String,
    /// Shared encryption key.
    pub encryption_key: String,
    /// Server endpoint.
    pub host: String,
    pub cipher: CipherKind,
    pub encoding: Encoding,
    /// Bound on each transport call.
    pub timeout: Duration,
    /// Defer commit delivery to the end of the request.
    pub post_commit: bool,
    /// Keep only errors and warnings in the log after a successful call.
    pub smart_notify: bool,
    /// Debug mode: debug log entries are kept and test helpers are enabled.
    pub debug: bool,
    /// Running under automated CI: commits are never delivered.
    pub ci_bypass: bool,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            identifier: String::new(),
            encryption_key: String::new(),
            host: String::new(),
            cipher: CipherKind::default(),
            encoding: Encoding::default(),
            timeout: DEFAULT_TIMEOUT,
            post_commit: false,
            smart_notify: false,
            debug: false,
            ci_bypass: false,
        }
    }
}

impl ConnectorConfig {
    /// Create a configuration with the three connection parameters.
    pub fn new(
        identifier: impl Into<String>,
        encryption_key: impl Into<String>,
        host: impl Into<String>,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            encryption_key: encryption_key.into(),
            host: host.into(),
            ..Self::default()
        }
    }

    pub fn with_cipher(mut self, cipher: CipherKind) -> Self {
        self.cipher = cipher;
        self
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_post_commit(mut self, enabled: bool) -> Self {
        self.post_commit = enabled;
        self
    }

    pub fn with_smart_notify(mut self, enabled: bool) -> Self {
        self.smart_notify = enabled;
        self
    }

    pub fn with_debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    pub fn with_ci_bypass(mut self, enabled: bool) -> Self {
        self.ci_bypass = enabled;
        self
    }

    /// Build from key/value settings.
    pub fn from_settings<I, K, V>(settings: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();
        for (key, value) in settings {
            config.apply(key.as_ref(), value.as_ref())?;
        }
        Ok(config)
    }

    /// Build from a JSON object of settings. Scalar values may be text,
    /// numbers or booleans.
    pub fn from_json(json: &str) -> Result<Self> {
        let document: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| WireError::Config(format!("invalid settings document: {}", e)))?;
        let object = document
            .as_object()
            .ok_or_else(|| WireError::Config("settings document is not an object".into()))?;

        let mut config = Self::default();
        for (key, value) in object {
            let text = match value {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Bool(b) => b.to_string(),
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Null => continue,
                _ => {
                    return Err(WireError::Config(format!(
                        "setting {} must be a scalar",
                        key
                    )))
                }
            };
            config.apply(key, &text)?;
        }
        Ok(config)
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            "WsIdentifier" => self.identifier = value.trim().to_string(),
            "WsEncryptionKey" => self.encryption_key = value.to_string(),
            "WsHost" => self.host = value.trim().to_string(),
            "WsCrypt" => {
                self.cipher = value
                    .parse()
                    .map_err(|e: syncbridge_core::CoreError| WireError::Config(e.to_string()))?
            }
            "WsEncode" => self.encoding = value.parse()?,
            "WsTimeout" => self.timeout = parse_timeout(value)?,
            "WsPostCommit" => self.post_commit = parse_flag(key, value)?,
            "SmartNotify" => self.smart_notify = parse_flag(key, value)?,
            "WsDebug" => self.debug = parse_flag(key, value)?,
            "WsCiBypass" => self.ci_bypass = parse_flag(key, value)?,
            _ => tracing::trace!(key, "ignoring unknown setting"),
        }
        Ok(())
    }

    /// Check that host, identifier and key are all set.
    pub fn verify(&self) -> Result<()> {
        let missing: Vec<&str> = [
            ("WsHost", &self.host),
            ("WsIdentifier", &self.identifier),
            ("WsEncryptionKey", &self.encryption_key),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(key, _)| key)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(WireError::Config(format!("missing {}", missing.join(", "))))
        }
    }
}

impl fmt::Debug for ConnectorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectorConfig")
            .field("identifier", &self.identifier)
            .field("encryption_key", &"[REDACTED]")
            .field("host", &self.host)
            .field("cipher", &self.cipher)
            .field("encoding", &self.encoding)
            .field("timeout", &self.timeout)
            .field("post_commit", &self.post_commit)
            .field("smart_notify", &self.smart_notify)
            .field("debug", &self.debug)
            .field("ci_bypass", &self.ci_bypass)
            .finish()
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(WireError::Config(format!("{} expects a flag, got {:?}", key, other))),
    }
}

fn parse_timeout(value: &str) -> Result<Duration> {
    let seconds: u64 = value
        .trim()
        .parse()
        .map_err(|_| WireError::Config(format!("WsTimeout expects seconds, got {:?}", value)))?;
    if seconds == 0 {
        return Err(WireError::Config("WsTimeout must be positive".into()));
    }
    Ok(Duration::from_secs(seconds))
}
