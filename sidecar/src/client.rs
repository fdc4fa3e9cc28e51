//! Typed client for the sidecar's HTTP protocol.
//!
//! [`BridgeClient`] owns the sidecar process and the linter session sent to
//! it. Every operation runs under one async mutex, so a session change can
//! never interleave with an analysis. Failures are logged here and surface
//! as `false` / `None`; callers never see transport errors.

use std::path::Path;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use lintbridge_types::{Language, RuleConfig};

use crate::error::BridgeError;
use crate::process::{Sidecar, SidecarFactory, SidecarHandle};
use crate::protocol::{
    AnalysisOutcome, AnalysisRequest, AnalysisResponseBody, Endpoint, InitLinterRequest,
    ParsedConfig, TsConfigRequest, TsConfigResponse,
};
use crate::tsconfig::ProjectConfigSource;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The configuration last sent with `init-linter`.
#[derive(Debug, Clone)]
struct LinterSession {
    language: Language,
    rules: Vec<RuleConfig>,
    environments: Vec<String>,
    globals: Vec<String>,
    /// Launch generation the session was sent to.
    generation: u64,
}

impl LinterSession {
    fn matches(
        &self,
        language: Language,
        rules: &[RuleConfig],
        environments: &[String],
        globals: &[String],
    ) -> bool {
        self.language == language
            && self.rules == rules
            && self.environments == environments
            && self.globals == globals
    }
}

struct Inner<P> {
    sidecar: Option<P>,
    port: u16,
    /// Incremented on every launch.
    generation: u64,
    session: Option<LinterSession>,
}

pub struct BridgeClient<F: SidecarFactory> {
    factory: F,
    http: reqwest::Client,
    request_timeout: Duration,
    inner: Mutex<Inner<F::Process>>,
}

impl<F: SidecarFactory> BridgeClient<F> {
    #[must_use]
    pub fn new(factory: F) -> Self {
        let http = reqwest::Client::builder()
            .no_proxy()
            .build()
            .unwrap_or_else(|e| {
                tracing::error!("Failed to build sidecar HTTP client: {e}. Using defaults.");
                reqwest::Client::new()
            });
        Self {
            factory,
            http,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            inner: Mutex::new(Inner {
                sidecar: None,
                port: 0,
                generation: 0,
                session: None,
            }),
        }
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Make sure a sidecar is listening, relaunching one that has exited.
    pub async fn start(&self) -> bool {
        let mut inner = self.inner.lock().await;
        match self.ensure_started(&mut inner).await {
            Ok(_) => true,
            Err(e) => {
                tracing::error!("Sidecar is unavailable: {e:#}");
                false
            }
        }
    }

    /// Kill the sidecar without the protocol handshake.
    pub async fn stop(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(sidecar) = inner.sidecar.take() {
            sidecar.stop().await;
        }
    }

    /// Ask the sidecar to shut down, then make sure it is gone.
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        let Some(sidecar) = inner.sidecar.take() else {
            return;
        };
        if sidecar.is_running()
            && let Err(e) = self.call::<()>(inner.port, Endpoint::Close, None).await
        {
            // The sidecar may drop the connection while exiting.
            tracing::debug!("Close request did not complete: {e:#}");
        }
        sidecar.stop().await;
        tracing::info!("Sidecar closed");
    }

    /// Replace the linter session with a full rule set.
    pub async fn init_linter(
        &self,
        language: Language,
        rules: &[RuleConfig],
        environments: &[String],
        globals: &[String],
    ) -> bool {
        let mut inner = self.inner.lock().await;
        let result = async {
            let port = self.ensure_started(&mut inner).await?;
            let session = LinterSession {
                language,
                rules: rules.to_vec(),
                environments: environments.to_vec(),
                globals: globals.to_vec(),
                generation: inner.generation,
            };
            self.send_session(port, &session).await?;
            inner.session = Some(session);
            Ok::<_, BridgeError>(())
        }
        .await;

        match result {
            Ok(()) => {
                tracing::info!(%language, rules = rules.len(), "Linter initialized");
                true
            }
            Err(e) => {
                tracing::error!(%language, "Failed to initialize linter: {e:#}");
                false
            }
        }
    }

    /// Whether `init_linter` must run before analyzing `language` with `rules`.
    pub async fn needs_linter_init(&self, language: Language, rules: &[RuleConfig]) -> bool {
        let inner = self.inner.lock().await;
        inner
            .session
            .as_ref()
            .is_none_or(|session| session.language != language || session.rules != rules)
    }

    /// Discard the sidecar's cached project state.
    pub async fn new_tsconfig_session(&self) -> bool {
        let mut inner = self.inner.lock().await;
        let result = async {
            let port = self.ensure_started(&mut inner).await?;
            self.call::<()>(port, Endpoint::NewTsConfig, None).await
        }
        .await;
        match result {
            Ok(_) => true,
            Err(e) => {
                tracing::error!("Failed to open a new project config session: {e:#}");
                false
            }
        }
    }

    /// Ask the sidecar which files and references a project config declares.
    pub async fn parse_config(&self, path: &Path) -> Option<ParsedConfig> {
        let mut inner = self.inner.lock().await;
        let result = async {
            let port = self.ensure_started(&mut inner).await?;
            let endpoint = Endpoint::TsConfigFiles;
            let text = self
                .call(port, endpoint, Some(&TsConfigRequest { tsconfig: path }))
                .await?;
            decode::<TsConfigResponse>(endpoint, &text)
        }
        .await;
        match result {
            Ok(response) => Some(ParsedConfig::from(response)),
            Err(e) => {
                tracing::error!(config = %path.display(), "Failed to read project config: {e:#}");
                None
            }
        }
    }

    /// Analyze one file with the active linter session.
    ///
    /// Returns `None` when there is no session for the file's language or
    /// when the sidecar cannot be reached.
    pub async fn analyze(&self, request: &AnalysisRequest) -> Option<AnalysisOutcome> {
        let mut inner = self.inner.lock().await;
        let result = self.analyze_locked(&mut inner, request).await;
        report_outcome(request, result)
    }

    /// Analyze one file under exactly the given linter configuration.
    ///
    /// Session check, `init-linter` and the analysis share one critical
    /// section, so a concurrent caller with another configuration can delay
    /// this call but never change the rules it runs with. A transient
    /// failure is retried once after making sure the sidecar is healthy.
    pub async fn analyze_with(
        &self,
        request: &AnalysisRequest,
        rules: &[RuleConfig],
        environments: &[String],
        globals: &[String],
    ) -> Option<AnalysisOutcome> {
        let mut inner = self.inner.lock().await;
        let mut result = self
            .analyze_with_locked(&mut inner, request, rules, environments, globals)
            .await;
        if let Err(e) = &result
            && e.is_transient()
        {
            tracing::warn!(file = %request.path.display(), "Retrying analysis: {e:#}");
            result = self
                .analyze_with_locked(&mut inner, request, rules, environments, globals)
                .await;
        }
        report_outcome(request, result)
    }

    pub async fn sidecar_handle(&self) -> SidecarHandle {
        let inner = self.inner.lock().await;
        inner
            .sidecar
            .as_ref()
            .map_or_else(SidecarHandle::not_started, |sidecar| sidecar.handle())
    }

    async fn analyze_locked(
        &self,
        inner: &mut Inner<F::Process>,
        request: &AnalysisRequest,
    ) -> Result<AnalysisOutcome, BridgeError> {
        let port = self.ensure_started(inner).await?;
        let generation = inner.generation;

        let session = inner
            .session
            .as_mut()
            .filter(|session| session.language == request.language)
            .ok_or(BridgeError::LinterNotInitialized(request.language))?;
        if session.generation != generation {
            tracing::info!(language = %session.language, "Replaying linter session after relaunch");
            self.send_session(port, session).await?;
            session.generation = generation;
        }

        self.post_analysis(port, request).await
    }

    async fn analyze_with_locked(
        &self,
        inner: &mut Inner<F::Process>,
        request: &AnalysisRequest,
        rules: &[RuleConfig],
        environments: &[String],
        globals: &[String],
    ) -> Result<AnalysisOutcome, BridgeError> {
        let port = self.ensure_started(inner).await?;
        let generation = inner.generation;

        let current = inner.session.as_ref().is_some_and(|session| {
            session.generation == generation
                && session.matches(request.language, rules, environments, globals)
        });
        if !current {
            // The sidecar's session is unknown until init-linter succeeds.
            inner.session = None;
            let session = LinterSession {
                language: request.language,
                rules: rules.to_vec(),
                environments: environments.to_vec(),
                globals: globals.to_vec(),
                generation,
            };
            self.send_session(port, &session).await?;
            tracing::info!(language = %request.language, rules = rules.len(), "Linter initialized");
            inner.session = Some(session);
        }

        self.post_analysis(port, request).await
    }

    async fn post_analysis(
        &self,
        port: u16,
        request: &AnalysisRequest,
    ) -> Result<AnalysisOutcome, BridgeError> {
        let endpoint = Endpoint::Analyze(request.language);
        let text = self.call(port, endpoint, Some(&request.body())).await?;
        let body = decode::<AnalysisResponseBody>(endpoint, &text)?;
        Ok(AnalysisOutcome::from(body))
    }

    async fn ensure_started(&self, inner: &mut Inner<F::Process>) -> Result<u16, BridgeError> {
        if let Some(sidecar) = inner.sidecar.as_ref() {
            if sidecar.is_running() {
                return Ok(inner.port);
            }
            tracing::warn!("Sidecar process has exited. Cleaning up and relaunching");
            sidecar.stop().await;
            inner.sidecar = None;
        }

        let sidecar = self.factory.create()?;
        inner.generation += 1;
        match sidecar.start().await {
            Ok(port) => {
                inner.port = port;
                inner.sidecar = Some(sidecar);
                Ok(port)
            }
            Err(e) => {
                sidecar.stop().await;
                Err(e)
            }
        }
    }

    async fn send_session(&self, port: u16, session: &LinterSession) -> Result<(), BridgeError> {
        let request = InitLinterRequest {
            rules: &session.rules,
            environments: &session.environments,
            globals: &session.globals,
        };
        self.call(port, Endpoint::InitLinter, Some(&request))
            .await
            .map(|_| ())
    }

    async fn call<B: Serialize + Sync>(
        &self,
        port: u16,
        endpoint: Endpoint,
        body: Option<&B>,
    ) -> Result<String, BridgeError> {
        let path = endpoint.path();
        let url = format!("http://127.0.0.1:{port}/{path}");
        let mut request = self.http.post(&url).timeout(self.request_timeout);
        if let Some(body) = body {
            request = request.json(body);
        }

        let started = Instant::now();
        let connection = |source| BridgeError::Connection {
            port,
            endpoint: path,
            source,
        };
        let response = request.send().await.map_err(connection)?;
        let status = response.status();
        let text = response.text().await.map_err(connection)?;
        tracing::debug!(
            endpoint = path,
            %status,
            elapsed_ms = started.elapsed().as_millis(),
            "Sidecar roundtrip"
        );

        if !status.is_success() {
            return Err(BridgeError::Protocol {
                endpoint: path,
                message: format!("HTTP {status}: {text}"),
            });
        }
        Ok(text)
    }
}

fn decode<T: DeserializeOwned>(endpoint: Endpoint, text: &str) -> Result<T, BridgeError> {
    serde_json::from_str(text).map_err(|e| BridgeError::Protocol {
        endpoint: endpoint.path(),
        message: format!("invalid JSON body: {e}"),
    })
}

fn report_outcome(
    request: &AnalysisRequest,
    result: Result<AnalysisOutcome, BridgeError>,
) -> Option<AnalysisOutcome> {
    match result {
        Ok(outcome) => {
            if let AnalysisOutcome::ParsingFailed(error) = &outcome {
                tracing::warn!("{}", error.user_message(&request.path));
            }
            Some(outcome)
        }
        Err(e @ BridgeError::LinterNotInitialized(_)) => {
            tracing::warn!(file = %request.path.display(), "Refusing to analyze: {e}");
            None
        }
        Err(e) => {
            tracing::error!(file = %request.path.display(), "Analysis failed: {e:#}");
            None
        }
    }
}

impl<F: SidecarFactory> ProjectConfigSource for BridgeClient<F> {
    async fn start(&self) -> bool {
        BridgeClient::start(self).await
    }

    async fn new_session(&self) -> bool {
        self.new_tsconfig_session().await
    }

    async fn parse_config(&self, path: &Path) -> Option<ParsedConfig> {
        BridgeClient::parse_config(self, path).await
    }
}
