//! Client, resolver and analyzer wired together against an emulated sidecar.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use lintbridge_config::LinterGlobals;
use lintbridge_sidecar::{
    BridgeClient, BridgeError, ConfigResolver, FileAnalysis, FileAnalyzer, InitializeOutcome,
    QualityProfile, RuleKeyTranslator, RulesProvider, Sidecar, SidecarFactory, SidecarHandle,
    SidecarState,
};
use lintbridge_types::Language;

struct HttpSidecar {
    port: u16,
    alive: Arc<AtomicBool>,
}

impl Sidecar for HttpSidecar {
    async fn start(&self) -> Result<u16, BridgeError> {
        self.alive.store(true, Ordering::SeqCst);
        Ok(self.port)
    }

    fn is_running(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn stop(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    fn handle(&self) -> SidecarHandle {
        SidecarHandle {
            pid: None,
            port: Some(self.port),
            state: SidecarState::Running,
        }
    }
}

struct HttpSidecarFactory {
    port: u16,
    alive: Arc<AtomicBool>,
    launches: Arc<AtomicUsize>,
}

impl SidecarFactory for HttpSidecarFactory {
    type Process = HttpSidecar;

    fn create(&self) -> Result<HttpSidecar, BridgeError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(HttpSidecar {
            port: self.port,
            alive: Arc::clone(&self.alive),
        })
    }
}

fn write(path: &Path, content: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

#[tokio::test]
async fn typescript_file_is_analyzed_with_its_project_config() {
    let workspace = tempfile::tempdir().unwrap();
    let project = workspace.path().join("project");
    let tsconfig = project.join("tsconfig.json");
    let source = project.join("src/a.ts");
    write(&tsconfig, "{}");
    write(&source, "let unused = 1;\n");
    write(&project.join("node_modules/dep/tsconfig.json"), "{}");

    let rules_dir = workspace.path().join("rules");
    write(
        &rules_dir.join("no-unused-vars.js"),
        "// https://jira.sonarsource.com/browse/RSPEC-1481\n",
    );
    write(
        &rules_dir.join("max-switch-cases.js"),
        "// https://jira.sonarsource.com/browse/RSPEC-1479\n",
    );
    let translator = Arc::new(RuleKeyTranslator::generate_mapping(&rules_dir));

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/new-tsconfig"))
        .respond_with(ResponseTemplate::new(200).set_body_string("OK!"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/tsconfig-files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "files": [source.to_string_lossy()],
            "projectReferences": []
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/init-linter"))
        .and(body_partial_json(json!({
            "rules": [
                { "key": "no-unused-vars", "configurations": [] },
                { "key": "max-switch-cases", "configurations": [{ "maximum": 10 }] }
            ],
            "globals": ["angular", "goog", "google", "OpenLayers", "d3", "dojo", "dojox", "dijit", "Backbone", "moment", "casper"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_string("OK!"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/analyze-ts"))
        .and(body_partial_json(json!({
            "filePath": source.to_string_lossy(),
            "tsConfigs": [tsconfig.to_string_lossy()]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issues": [{
                "line": 1, "column": 4, "endLine": 1, "endColumn": 10,
                "message": "Remove this unused variable", "ruleId": "no-unused-vars",
                "secondaryLocations": []
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let launches = Arc::new(AtomicUsize::new(0));
    let client = Arc::new(BridgeClient::new(HttpSidecarFactory {
        port: server.address().port(),
        alive: Arc::new(AtomicBool::new(false)),
        launches: Arc::clone(&launches),
    }));
    let resolver = Arc::new(ConfigResolver::new(Arc::clone(&client)));

    let outcome = resolver
        .initialize(workspace.path(), CancellationToken::new())
        .await;
    assert_eq!(outcome, InitializeOutcome::Completed(1));
    assert_eq!(resolver.find_config_file(&source).as_deref(), Some(tsconfig.as_path()));

    let profile = QualityProfile::from_json(
        &json!({
            "language": "typescript",
            "name": "Sonar way",
            "rules": [
                { "repositoryKey": "typescript", "key": "S1481" },
                {
                    "repositoryKey": "typescript",
                    "key": "S1479",
                    "parameters": [{ "key": "maximum", "value": "10" }]
                }
            ]
        })
        .to_string(),
    )
    .unwrap();
    let rules = RulesProvider::new(Arc::clone(&translator), []).engine_rules(&profile);

    let analyzer = FileAnalyzer::new(
        Arc::clone(&client),
        Arc::clone(&resolver),
        translator,
        LinterGlobals::default(),
    )
    .with_rules(Language::TypeScript, rules);

    let content = fs::read_to_string(&source).unwrap();
    let FileAnalysis::Issues(issues) = analyzer
        .analyze_file(&source, &content, Language::TypeScript)
        .await
    else {
        panic!("expected issues");
    };
    assert_eq!(issues.len(), 1);
    assert_eq!(issues[0].rule_ref(), "typescript:S1481");
    assert_eq!(launches.load(Ordering::SeqCst), 1);
}
