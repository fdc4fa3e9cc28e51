//! Error taxonomy for the sidecar boundary.
//!
//! Process and transport failures never escape [`crate::BridgeClient`]; they
//! are logged there and turned into `false` / `None`. The variants exist so
//! internal code can propagate with `?` and log one precise cause.

use std::path::PathBuf;

use lintbridge_types::{CanonicalRuleKey, Language, ParsingError};

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The sidecar could not be launched or never announced its port.
    #[error("sidecar failed to start: {0}")]
    ProcessStart(String),

    /// The sidecar could not be reached; transient, retry after a restart.
    #[error("cannot reach sidecar on port {port} ({endpoint})")]
    Connection {
        port: u16,
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The sidecar answered but the body was not what the protocol promises.
    #[error("unexpected response from sidecar ({endpoint}): {message}")]
    Protocol {
        endpoint: &'static str,
        message: String,
    },

    /// The sidecar reported a parse failure for the analyzed file.
    #[error("sidecar could not parse the file: {} ({})", .0.message, .0.code)]
    RemoteParsing(ParsingError),

    /// A vendor rule key has no engine counterpart.
    #[error("no engine rule for {0}")]
    RuleMappingMiss(CanonicalRuleKey),

    /// A project configuration file could not be interpreted.
    #[error("cannot parse project config {}: {message}", path.display())]
    ConfigParse { path: PathBuf, message: String },

    /// Analysis requested without a linter session for that language.
    #[error("linter is not initialized for {0}")]
    LinterNotInitialized(Language),
}

impl BridgeError {
    pub(crate) fn process_start(message: impl Into<String>) -> Self {
        Self::ProcessStart(message.into())
    }

    /// Whether the failure is worth retrying after the sidecar is restarted.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::ProcessStart(_))
    }
}
