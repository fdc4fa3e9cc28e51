//! Broker for the out-of-process lint engine.
//!
//! The engine runs as a Node.js sidecar speaking JSON over local HTTP. This
//! crate launches and supervises it, keeps its linter session in sync, maps
//! rule keys between the vendor and engine key spaces, and works out which
//! project config governs each source file.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod analyzer;
pub mod artifacts;
pub mod client;
pub mod error;
pub mod process;
pub mod profile;
pub mod rules;
pub mod tsconfig;

pub(crate) mod protocol;

pub use analyzer::{FileAnalysis, FileAnalyzer, ReportedIssue};
pub use artifacts::{ArtifactProvisioner, EngineArtifacts, InstalledArtifacts};
pub use client::BridgeClient;
pub use error::BridgeError;
pub use process::{
    NodeSidecarFactory, Sidecar, SidecarFactory, SidecarHandle, SidecarLaunch, SidecarProcess,
    SidecarState,
};
pub use profile::{ProfileRule, QualityProfile, RuleParameter, RulesProvider};
pub use protocol::{AnalysisOutcome, AnalysisRequest, ConfigFileError, ParsedConfig};
pub use rules::{RuleKeyCache, RuleKeyTranslator};
pub use tsconfig::{
    ConfigGraph, ConfigLocator, ConfigResolver, InitializeOutcome, PROJECT_CONFIG_FILE_NAME,
    ProjectConfig, ProjectConfigSource,
};
