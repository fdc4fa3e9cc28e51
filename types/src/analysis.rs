//! Analysis results reported by the sidecar.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Secondary location attached to an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueLocation {
    pub line: u32,
    pub column: u32,
    pub end_line: u32,
    pub end_column: u32,
    #[serde(default)]
    pub message: Option<String>,
}

/// A single issue raised by an engine rule.
///
/// Lines are 1-indexed and columns 0-indexed, as the engine reports them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub line: u32,
    pub column: u32,
    #[serde(default)]
    pub end_line: Option<u32>,
    #[serde(default)]
    pub end_column: Option<u32>,
    pub message: String,
    pub rule_id: String,
    #[serde(default)]
    pub secondary_locations: Vec<IssueLocation>,
    #[serde(default)]
    pub cost: Option<f64>,
}

/// Kind of parse failure reported by the sidecar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParsingErrorCode {
    Parsing,
    MissingTypescript,
    UnsupportedTypescript,
    FailingTypescript,
    #[default]
    #[serde(other)]
    GeneralError,
}

impl ParsingErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Parsing => "PARSING",
            Self::MissingTypescript => "MISSING_TYPESCRIPT",
            Self::UnsupportedTypescript => "UNSUPPORTED_TYPESCRIPT",
            Self::FailingTypescript => "FAILING_TYPESCRIPT",
            Self::GeneralError => "GENERAL_ERROR",
        }
    }
}

impl fmt::Display for ParsingErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured parse failure returned instead of issues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsingError {
    #[serde(default)]
    pub line: Option<u32>,
    pub message: String,
    #[serde(default)]
    pub code: ParsingErrorCode,
}

impl ParsingError {
    /// Message suitable for showing to the user of the analyzed file.
    #[must_use]
    pub fn user_message(&self, path: &Path) -> String {
        match self.code {
            ParsingErrorCode::MissingTypescript => {
                "TypeScript dependency was not found and it is required for analysis.".to_string()
            }
            ParsingErrorCode::UnsupportedTypescript => format!(
                "{}\nIf it's not possible to upgrade version of TypeScript used by the project, \
                 consider installing supported TypeScript version just for the time of analysis",
                self.message
            ),
            _ => match self.line {
                Some(line) => format!(
                    "Failed to parse file [{}] at line {line}: {}",
                    path.display(),
                    self.message
                ),
                None => format!("Failed to parse file [{}]: {}", path.display(), self.message),
            },
        }
    }
}
