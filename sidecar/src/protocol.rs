//! Internal serde types for the sidecar's HTTP/JSON protocol.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use lintbridge_types::{Issue, Language, ParsingError, ParsingErrorCode, RuleConfig};

/// The six endpoints the sidecar serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Endpoint {
    InitLinter,
    NewTsConfig,
    TsConfigFiles,
    Analyze(Language),
    Close,
}

impl Endpoint {
    pub fn path(self) -> &'static str {
        match self {
            Self::InitLinter => "init-linter",
            Self::NewTsConfig => "new-tsconfig",
            Self::TsConfigFiles => "tsconfig-files",
            Self::Analyze(language) => language.analyze_endpoint(),
            Self::Close => "close",
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct InitLinterRequest<'a> {
    pub rules: &'a [RuleConfig],
    pub environments: &'a [String],
    pub globals: &'a [String],
}

#[derive(Debug, Serialize)]
pub(crate) struct TsConfigRequest<'a> {
    pub tsconfig: &'a Path,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TsConfigResponse {
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub project_references: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_code: Option<ParsingErrorCode>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AnalysisRequestBody<'a> {
    pub file_path: &'a Path,
    pub file_content: &'a str,
    pub ignore_header_comments: bool,
    #[serde(rename = "tsConfigs")]
    pub ts_configs: Vec<&'a Path>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AnalysisResponseBody {
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub parsing_error: Option<ParsingError>,
}

/// Error reported by `tsconfig-files` for a single config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFileError {
    pub message: String,
    pub code: Option<ParsingErrorCode>,
}

/// Result of asking the sidecar to interpret one project config file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedConfig {
    pub files: Vec<PathBuf>,
    pub references: Vec<PathBuf>,
    pub error: Option<ConfigFileError>,
}

impl From<TsConfigResponse> for ParsedConfig {
    fn from(response: TsConfigResponse) -> Self {
        let error = match (response.error, response.error_code) {
            (Some(message), code) => Some(ConfigFileError { message, code }),
            (None, Some(code)) => Some(ConfigFileError {
                message: code.as_str().to_string(),
                code: Some(code),
            }),
            (None, None) => None,
        };
        Self {
            files: response.files.into_iter().map(PathBuf::from).collect(),
            references: response
                .project_references
                .into_iter()
                .map(PathBuf::from)
                .collect(),
            error,
        }
    }
}

/// What the sidecar answered for an analysis request.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    Issues(Vec<Issue>),
    ParsingFailed(ParsingError),
}

impl From<AnalysisResponseBody> for AnalysisOutcome {
    fn from(body: AnalysisResponseBody) -> Self {
        match body.parsing_error {
            Some(error) => Self::ParsingFailed(error),
            None => Self::Issues(body.issues),
        }
    }
}

/// A file to analyze.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub path: PathBuf,
    pub content: String,
    pub language: Language,
    pub ignore_header_comments: bool,
    /// Governing project config, when one is known.
    pub config_path: Option<PathBuf>,
}

impl AnalysisRequest {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, content: impl Into<String>, language: Language) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            language,
            ignore_header_comments: true,
            config_path: None,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config_path: Option<PathBuf>) -> Self {
        self.config_path = config_path;
        self
    }

    pub(crate) fn body(&self) -> AnalysisRequestBody<'_> {
        AnalysisRequestBody {
            file_path: &self.path,
            file_content: &self.content,
            ignore_header_comments: self.ignore_header_comments,
            ts_configs: self.config_path.iter().map(PathBuf::as_path).collect(),
        }
    }
}
