//! End-to-end analysis of a single file.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lintbridge_config::LinterGlobals;
use lintbridge_types::{CanonicalRuleKey, EngineRuleKey, Issue, Language, RuleConfig};

use crate::client::BridgeClient;
use crate::error::BridgeError;
use crate::process::SidecarFactory;
use crate::protocol::{AnalysisOutcome, AnalysisRequest};
use crate::rules::RuleKeyTranslator;
use crate::tsconfig::ConfigResolver;

/// An issue reported in the vendor key space (`javascript:S1481`).
#[derive(Debug, Clone, PartialEq)]
pub struct ReportedIssue {
    pub path: PathBuf,
    pub repository: &'static str,
    pub rule: CanonicalRuleKey,
    pub issue: Issue,
}

impl ReportedIssue {
    #[must_use]
    pub fn rule_ref(&self) -> String {
        format!("{}:{}", self.repository, self.rule)
    }
}

impl fmt::Display for ReportedIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{} [{}] {}",
            self.path.display(),
            self.issue.line,
            self.issue.column,
            self.rule_ref(),
            self.issue.message
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FileAnalysis {
    Issues(Vec<ReportedIssue>),
    NotAnalyzed { reason: String },
}

impl FileAnalysis {
    fn not_analyzed(reason: impl Into<String>) -> Self {
        Self::NotAnalyzed {
            reason: reason.into(),
        }
    }
}

pub struct FileAnalyzer<F: SidecarFactory> {
    client: Arc<BridgeClient<F>>,
    resolver: Arc<ConfigResolver<BridgeClient<F>>>,
    translator: Arc<RuleKeyTranslator>,
    globals: LinterGlobals,
    rules: HashMap<Language, Vec<RuleConfig>>,
}

impl<F: SidecarFactory> FileAnalyzer<F> {
    #[must_use]
    pub fn new(
        client: Arc<BridgeClient<F>>,
        resolver: Arc<ConfigResolver<BridgeClient<F>>>,
        translator: Arc<RuleKeyTranslator>,
        globals: LinterGlobals,
    ) -> Self {
        Self {
            client,
            resolver,
            translator,
            globals,
            rules: HashMap::new(),
        }
    }

    /// Set the active rule set for one language.
    #[must_use]
    pub fn with_rules(mut self, language: Language, rules: Vec<RuleConfig>) -> Self {
        self.rules.insert(language, rules);
        self
    }

    pub async fn analyze_file(&self, path: &Path, content: &str, language: Language) -> FileAnalysis {
        let Some(rules) = self.rules.get(&language) else {
            return FileAnalysis::not_analyzed(format!("no rules are active for {language}"));
        };
        if !self.client.start().await {
            return FileAnalysis::not_analyzed("the analysis engine is not available");
        }

        let config_path = self.resolver.find_config_file(path);
        if config_path.is_none() && language == Language::TypeScript {
            tracing::debug!(file = %path.display(), "No project config governs this file");
        }
        let request = AnalysisRequest::new(path, content, language).with_config(config_path);

        let outcome = self
            .client
            .analyze_with(
                &request,
                rules,
                self.globals.environments(),
                self.globals.globals(),
            )
            .await;
        match outcome {
            Some(AnalysisOutcome::Issues(issues)) => {
                tracing::debug!(file = %path.display(), issues = issues.len(), "Analysis complete");
                FileAnalysis::Issues(
                    issues
                        .into_iter()
                        .map(|issue| self.report(path, language, issue))
                        .collect(),
                )
            }
            Some(AnalysisOutcome::ParsingFailed(error)) => {
                let reason = error.user_message(path);
                let error = BridgeError::RemoteParsing(error);
                tracing::debug!(file = %path.display(), "{error}");
                FileAnalysis::not_analyzed(reason)
            }
            None => FileAnalysis::not_analyzed("the analysis request failed"),
        }
    }

    fn report(&self, path: &Path, language: Language, issue: Issue) -> ReportedIssue {
        let engine = EngineRuleKey::new(issue.rule_id.as_str());
        ReportedIssue {
            path: path.to_path_buf(),
            repository: language.repository(),
            rule: self.translator.to_canonical_key(&engine),
            issue,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::time::Duration;

    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path, path_regex};
    use wiremock::{Mock, MockServer, Request, ResponseTemplate};

    use super::*;
    use crate::client::tests::{FakeFactory, mount_ok};

    fn translator() -> Arc<RuleKeyTranslator> {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("no-unused-vars.js"),
            "// https://jira.sonarsource.com/browse/RSPEC-1481\n",
        )
        .unwrap();
        Arc::new(RuleKeyTranslator::generate_mapping(dir.path()))
    }

    fn analyzer(server: &MockServer) -> FileAnalyzer<FakeFactory> {
        let client = Arc::new(BridgeClient::new(FakeFactory::new(server)));
        let resolver = Arc::new(ConfigResolver::new(Arc::clone(&client)));
        FileAnalyzer::new(client, resolver, translator(), LinterGlobals::default())
            .with_rules(
                Language::JavaScript,
                vec![RuleConfig::new(EngineRuleKey::new("no-unused-vars"))],
            )
            .with_rules(Language::TypeScript, Vec::new())
    }

    #[tokio::test]
    async fn issues_are_reported_with_canonical_keys() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/init-linter"))
            .and(body_partial_json(json!({ "rules": [{ "key": "no-unused-vars" }] })))
            .respond_with(ResponseTemplate::new(200).set_body_string("OK!"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/analyze-js"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issues": [
                    {
                        "line": 1, "column": 4, "endLine": 1, "endColumn": 5,
                        "message": "Remove the declaration of the unused 'x' variable.",
                        "ruleId": "no-unused-vars", "secondaryLocations": []
                    },
                    {
                        "line": 2, "column": 0,
                        "message": "Custom finding", "ruleId": "custom-rule",
                        "secondaryLocations": []
                    }
                ]
            })))
            .expect(2)
            .mount(&server)
            .await;
        let analyzer = analyzer(&server);
        let file = Path::new("/p/a.js");

        let FileAnalysis::Issues(issues) = analyzer
            .analyze_file(file, "let x;\nfoo();", Language::JavaScript)
            .await
        else {
            panic!("expected issues");
        };
        assert_eq!(issues.len(), 2);
        assert_eq!(issues[0].rule_ref(), "javascript:S1481");
        assert_eq!(issues[1].rule_ref(), "javascript:custom-rule");
        assert_eq!(
            issues[0].to_string(),
            "/p/a.js:1:4 [javascript:S1481] Remove the declaration of the unused 'x' variable."
        );

        // The session is reused for the second file.
        analyzer
            .analyze_file(Path::new("/p/b.js"), "", Language::JavaScript)
            .await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn shared_analyzer_keeps_every_file_and_its_rules() {
        let server = MockServer::start().await;
        let active = Arc::new(std::sync::Mutex::new(String::new()));
        let initialized = Arc::clone(&active);
        Mock::given(method("POST"))
            .and(path("/init-linter"))
            .respond_with(move |request: &Request| {
                let body: serde_json::Value = request.body_json().unwrap();
                let rule = body["rules"][0]["key"].as_str().unwrap_or_default();
                *initialized.lock().unwrap() = rule.to_string();
                ResponseTemplate::new(200)
                    .set_body_string("OK!")
                    .set_delay(Duration::from_millis(50))
            })
            .mount(&server)
            .await;
        let reporting = Arc::clone(&active);
        Mock::given(method("POST"))
            .and(path_regex("^/analyze-(js|ts)$"))
            .respond_with(move |_: &Request| {
                let rule = reporting.lock().unwrap().clone();
                ResponseTemplate::new(200).set_body_json(json!({
                    "issues": [{ "line": 1, "column": 0, "message": "finding", "ruleId": rule }]
                }))
            })
            .mount(&server)
            .await;

        let client = Arc::new(BridgeClient::new(FakeFactory::new(&server)));
        let resolver = Arc::new(ConfigResolver::new(Arc::clone(&client)));
        let analyzer = Arc::new(
            FileAnalyzer::new(client, resolver, translator(), LinterGlobals::default())
                .with_rules(
                    Language::JavaScript,
                    vec![RuleConfig::new(EngineRuleKey::new("no-unused-vars"))],
                )
                .with_rules(
                    Language::TypeScript,
                    vec![RuleConfig::new(EngineRuleKey::new("no-empty"))],
                ),
        );

        let mut tasks = tokio::task::JoinSet::new();
        for round in 0..20 {
            let analyzer = Arc::clone(&analyzer);
            tasks.spawn(async move {
                let (language, file) = if round % 2 == 0 {
                    (Language::JavaScript, format!("/p/file{round}.js"))
                } else {
                    (Language::TypeScript, format!("/p/file{round}.ts"))
                };
                let outcome = analyzer.analyze_file(Path::new(&file), "", language).await;
                (language, outcome)
            });
        }

        let mut analyzed = 0;
        while let Some(joined) = tasks.join_next().await {
            let (language, outcome) = joined.unwrap();
            let issues = match outcome {
                FileAnalysis::Issues(issues) => issues,
                other => panic!("{language} file was not analyzed: {other:?}"),
            };
            let expected = match language {
                Language::JavaScript => "javascript:S1481",
                Language::TypeScript => "typescript:no-empty",
            };
            assert_eq!(issues.len(), 1);
            assert_eq!(issues[0].rule_ref(), expected);
            analyzed += 1;
        }
        assert_eq!(analyzed, 20);
    }

    #[tokio::test]
    async fn missing_typescript_is_not_analyzed_with_reason() {
        let server = MockServer::start().await;
        mount_ok(&server, "init-linter").await;
        Mock::given(method("POST"))
            .and(path("/analyze-ts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "parsingError": { "message": "Cannot find module 'typescript'", "code": "MISSING_TYPESCRIPT" }
            })))
            .mount(&server)
            .await;
        let analyzer = analyzer(&server);

        let outcome = analyzer
            .analyze_file(Path::new("/p/a.ts"), "let x: number;", Language::TypeScript)
            .await;
        assert_eq!(
            outcome,
            FileAnalysis::NotAnalyzed {
                reason: "TypeScript dependency was not found and it is required for analysis."
                    .to_string()
            }
        );
    }

    #[tokio::test]
    async fn syntax_error_names_file_and_line() {
        let server = MockServer::start().await;
        mount_ok(&server, "init-linter").await;
        Mock::given(method("POST"))
            .and(path("/analyze-js"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "parsingError": { "line": 3, "message": "Unexpected token", "code": "PARSING" }
            })))
            .mount(&server)
            .await;
        let analyzer = analyzer(&server);

        let FileAnalysis::NotAnalyzed { reason } = analyzer
            .analyze_file(Path::new("/p/a.js"), "if (", Language::JavaScript)
            .await
        else {
            panic!("expected a parse failure");
        };
        assert_eq!(reason, "Failed to parse file [/p/a.js] at line 3: Unexpected token");
    }

    #[tokio::test]
    async fn language_without_rules_is_not_analyzed() {
        let server = MockServer::start().await;
        let client = Arc::new(BridgeClient::new(FakeFactory::new(&server)));
        let resolver = Arc::new(ConfigResolver::new(Arc::clone(&client)));
        let analyzer =
            FileAnalyzer::new(client, resolver, translator(), LinterGlobals::default());

        let outcome = analyzer
            .analyze_file(Path::new("/p/a.js"), "", Language::JavaScript)
            .await;
        assert!(matches!(outcome, FileAnalysis::NotAnalyzed { .. }));
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}
