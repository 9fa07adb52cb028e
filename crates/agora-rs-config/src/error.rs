//! Failures raised while reading or checking `agora.json5` layers.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("agora config could not be read: {0}")]
    Io(#[from] std::io::Error),
    #[error("agora config is not valid json5: {0}")]
    Syntax(#[from] json5::Error),
    /// The merged document did not match [`crate::AgoraConfig`].
    #[error("agora config does not match the expected shape: {0}")]
    Shape(#[from] serde_json::Error),
    /// A layer holds an unknown key or a wrongly typed value. `location` is
    /// `layer:section.key`.
    #[error("agora config layer rejected at {location}: {reason}")]
    Schema { location: String, reason: String },
    /// A merged setting is out of range or contradicts another one.
    #[error("agora setting `{setting}` {reason}")]
    Setting { setting: String, reason: String },
}

impl ConfigError {
    pub(crate) fn setting(setting: &str, reason: impl Into<String>) -> Self {
        Self::Setting {
            setting: setting.to_string(),
            reason: reason.into(),
        }
    }
}
