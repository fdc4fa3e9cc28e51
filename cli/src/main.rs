//! lintbridge CLI.
//!
//! Usage:
//! ```bash
//! lintbridge analyze src/a.ts src/b.js --root . --profile sonar-way-ts.json
//! lintbridge rules ~/.lintbridge/eslint-bridge/package/lib/rules
//! lintbridge configs .
//! ```
//!
//! Logs go to stderr (`RUST_LOG`, default `info`); results go to stdout.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use lintbridge_config::{BridgeConfig, LinterGlobals};
use lintbridge_sidecar::{
    ArtifactProvisioner, BridgeClient, ConfigResolver, EngineArtifacts, FileAnalysis,
    FileAnalyzer, InitializeOutcome, InstalledArtifacts, NodeSidecarFactory, QualityProfile,
    RuleKeyCache, RuleKeyTranslator, RulesProvider,
};
use lintbridge_types::{CanonicalRuleKey, Language};

/// Analyze JavaScript and TypeScript files with the lint engine sidecar
#[derive(Parser)]
#[command(name = "lintbridge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (default: ~/.lintbridge/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze source files
    Analyze {
        /// Files to analyze
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Project root to search for tsconfig.json files
        #[arg(long)]
        root: Option<PathBuf>,

        /// Quality profile (JSON), one per language. Languages without a
        /// profile run every mapped rule.
        #[arg(long)]
        profile: Vec<PathBuf>,

        /// Canonical rule keys to leave out (can be specified multiple times)
        #[arg(long)]
        exclude: Vec<String>,
    },

    /// Print the rule key mapping of an engine rules directory
    Rules {
        /// Directory holding the engine's rule files
        rules_dir: PathBuf,
    },

    /// List the project configs found below a root
    Configs {
        /// Root directory
        #[arg(default_value = ".")]
        root: PathBuf,
    },
}

type Client = BridgeClient<NodeSidecarFactory>;

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<BridgeConfig> {
    match path {
        Some(path) => Ok(BridgeConfig::load_from(path)?),
        None => Ok(BridgeConfig::load()?.unwrap_or_default()),
    }
}

/// Locate the installed engine and build a client for it.
fn connect(config: &BridgeConfig) -> Result<(Arc<Client>, EngineArtifacts)> {
    let root = config
        .sidecar
        .artifacts_dir()
        .context("cannot determine the engine directory: no home directory")?;
    let provisioner: Arc<dyn ArtifactProvisioner> = Arc::new(InstalledArtifacts::new(root));
    let artifacts = provisioner
        .ensure_artifacts()
        .context("locating the analysis engine")?;
    tracing::info!(
        version = artifacts.version(),
        script = %artifacts.startup_script().display(),
        "Using analysis engine"
    );

    let factory = NodeSidecarFactory::new(provisioner, &config.sidecar);
    let client = BridgeClient::new(factory).with_request_timeout(config.sidecar.request_timeout());
    Ok((Arc::new(client), artifacts))
}

async fn load_profiles(paths: &[PathBuf]) -> Result<HashMap<Language, QualityProfile>> {
    let mut profiles = HashMap::new();
    for path in paths {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading profile {}", path.display()))?;
        let profile = QualityProfile::from_json(&raw)
            .with_context(|| format!("parsing profile {}", path.display()))?;
        if let Some(previous) = profiles.insert(profile.language, profile) {
            tracing::warn!(
                language = %previous.language,
                replaced = %previous.name,
                "More than one profile for the same language; using the last one"
            );
        }
    }
    Ok(profiles)
}

async fn analyze(
    config: &BridgeConfig,
    files: Vec<PathBuf>,
    root: Option<PathBuf>,
    profiles: Vec<PathBuf>,
    exclude: Vec<String>,
) -> Result<ExitCode> {
    let (client, artifacts) = connect(config)?;
    let translator = RuleKeyCache::new().get_or_build(artifacts.version(), artifacts.rules_dir());
    let provider = RulesProvider::new(
        Arc::clone(&translator),
        exclude.iter().map(|key| CanonicalRuleKey::new(key.as_str())),
    );
    let mut profiles = load_profiles(&profiles).await?;

    let resolver = Arc::new(ConfigResolver::new(Arc::clone(&client)));
    let mut analyzer = FileAnalyzer::new(
        Arc::clone(&client),
        Arc::clone(&resolver),
        Arc::clone(&translator),
        LinterGlobals::from_env(&config.linter),
    );
    for language in [Language::JavaScript, Language::TypeScript] {
        let profile = profiles
            .remove(&language)
            .unwrap_or_else(|| QualityProfile::all_mapped(language, &translator));
        analyzer = analyzer.with_rules(language, provider.engine_rules(&profile));
    }

    if let Some(root) = root {
        let root = std::path::absolute(&root)
            .with_context(|| format!("resolving {}", root.display()))?;
        match resolver.initialize(&root, CancellationToken::new()).await {
            InitializeOutcome::Completed(count) => {
                tracing::info!(configs = count, "Project configs loaded");
            }
            outcome => tracing::warn!(?outcome, "Continuing without project configs"),
        }
    }

    let mut total = 0usize;
    for file in files {
        let Some(language) = file
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Language::from_extension)
        else {
            tracing::warn!(file = %file.display(), "Not a JavaScript or TypeScript file, skipping");
            continue;
        };
        let path = std::path::absolute(&file)
            .with_context(|| format!("resolving {}", file.display()))?;
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) => {
                tracing::error!(file = %path.display(), "Cannot read file: {e}");
                continue;
            }
        };

        match analyzer.analyze_file(&path, &content, language).await {
            FileAnalysis::Issues(issues) => {
                total += issues.len();
                for issue in issues {
                    println!("{issue}");
                }
            }
            FileAnalysis::NotAnalyzed { reason } => {
                tracing::warn!(file = %path.display(), "Not analyzed: {reason}");
            }
        }
    }

    client.close().await;
    println!("{total} issue(s) found");
    Ok(if total == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_rules(rules_dir: &Path) -> ExitCode {
    let translator = RuleKeyTranslator::generate_mapping(rules_dir);
    for (canonical, engine) in translator.entries() {
        println!("{canonical}\t{engine}");
    }
    println!("{} rule(s) mapped", translator.len());
    ExitCode::SUCCESS
}

async fn print_configs(config: &BridgeConfig, root: &Path) -> Result<ExitCode> {
    let (client, _) = connect(config)?;
    let resolver = ConfigResolver::new(Arc::clone(&client));
    let root = std::path::absolute(root).with_context(|| format!("resolving {}", root.display()))?;

    let outcome = resolver.initialize(&root, CancellationToken::new()).await;
    client.close().await;

    if outcome == InitializeOutcome::SidecarUnavailable {
        anyhow::bail!("the analysis engine did not start");
    }
    let graph = resolver.configs();
    for project in graph.configs() {
        println!("{}", project.path.display());
        println!("  files: {}", project.files.len());
        for reference in &project.references {
            println!("  references: {}", reference.display());
        }
        if let Some(error) = &project.error {
            println!("  error: {error}");
        }
    }
    println!("{} project config(s)", graph.len());
    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Commands::Rules { rules_dir } => Ok(print_rules(&rules_dir)),
        Commands::Analyze {
            files,
            root,
            profile,
            exclude,
        } => {
            let config = load_config(cli.config.as_deref())?;
            analyze(&config, files, root, profile, exclude).await
        }
        Commands::Configs { root } => {
            let config = load_config(cli.config.as_deref())?;
            print_configs(&config, &root).await
        }
    }
}
