//! Core domain types for lintbridge.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the application.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory
#![allow(clippy::missing_panics_doc)] // Panics are documented in assertions

mod analysis;
mod rules;

pub use analysis::{Issue, IssueLocation, ParsingError, ParsingErrorCode};
pub use rules::{CanonicalRuleKey, EngineRuleKey, RuleConfig};

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Language
// ============================================================================

/// Source language of an analyzed file.
///
/// The sidecar exposes one analysis endpoint per language and the rule sets
/// differ between them, so the language is part of the linter session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    JavaScript,
    TypeScript,
}

impl Language {
    /// Sidecar endpoint that analyzes files of this language.
    #[must_use]
    pub const fn analyze_endpoint(self) -> &'static str {
        match self {
            Self::JavaScript => "analyze-js",
            Self::TypeScript => "analyze-ts",
        }
    }

    /// Rule repository used when reporting issues back in the vendor key space.
    #[must_use]
    pub const fn repository(self) -> &'static str {
        match self {
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
        }
    }

    /// Guess the language from a file extension.
    ///
    /// Returns `None` for extensions the engine does not analyze.
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "js" | "jsx" | "mjs" | "cjs" | "vue" => Some(Self::JavaScript),
            "ts" | "tsx" | "mts" | "cts" => Some(Self::TypeScript),
            _ => None,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::JavaScript => "JavaScript",
            Self::TypeScript => "TypeScript",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
