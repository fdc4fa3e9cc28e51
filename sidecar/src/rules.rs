//! Bidirectional mapping between vendor rule keys and engine rule keys.
//!
//! Each engine rule ships as one `*.js` file in the engine's rules directory.
//! A rule with a vendor counterpart carries a marker comment linking to its
//! RSPEC page; the file stem is the engine key.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex, PoisonError};

use regex::Regex;

use lintbridge_types::{CanonicalRuleKey, EngineRuleKey};

static RSPEC_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^// https://jira\.sonarsource\.com/browse/RSPEC-(\d+)\r?$")
        .expect("valid rule marker regex")
});

#[derive(Debug, Default)]
pub struct RuleKeyTranslator {
    to_engine: HashMap<CanonicalRuleKey, EngineRuleKey>,
    to_canonical: HashMap<EngineRuleKey, CanonicalRuleKey>,
}

impl RuleKeyTranslator {
    /// Scan the top-level `*.js` files of `rules_dir` and build the mapping.
    ///
    /// Never fails: unreadable files, files without a marker and keys that
    /// collide in either direction are skipped with a diagnostic.
    #[must_use]
    pub fn generate_mapping(rules_dir: &Path) -> Self {
        let mut translator = Self::default();

        let entries = match fs::read_dir(rules_dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(dir = %rules_dir.display(), "Cannot read rules directory: {e}");
                return translator;
            }
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "js"))
            .collect();
        files.sort();

        for file in files {
            let Some(stem) = file.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let source = match fs::read_to_string(&file) {
                Ok(source) => source,
                Err(e) => {
                    tracing::debug!(file = %file.display(), "Skipping unreadable rule file: {e}");
                    continue;
                }
            };
            let Some(number) = RSPEC_MARKER
                .captures(&source)
                .and_then(|captures| captures.get(1))
            else {
                tracing::debug!(file = %file.display(), "No RSPEC marker, skipping");
                continue;
            };

            let canonical = CanonicalRuleKey::from_rspec_number(number.as_str());
            let engine = EngineRuleKey::new(stem);
            translator.insert(canonical, engine);
        }

        tracing::info!(
            dir = %rules_dir.display(),
            rules = translator.len(),
            "Rule key mapping generated"
        );
        translator
    }

    /// Insert one pair unless either side is already mapped.
    fn insert(&mut self, canonical: CanonicalRuleKey, engine: EngineRuleKey) -> bool {
        if let Some(existing) = self.to_engine.get(&canonical) {
            tracing::warn!(
                %canonical,
                %engine,
                %existing,
                "Duplicate canonical rule key, keeping the first mapping"
            );
            return false;
        }
        if let Some(existing) = self.to_canonical.get(&engine) {
            tracing::warn!(
                %canonical,
                %engine,
                %existing,
                "Duplicate engine rule key, keeping the first mapping"
            );
            return false;
        }
        self.to_canonical.insert(engine.clone(), canonical.clone());
        self.to_engine.insert(canonical, engine);
        true
    }

    /// Engine key for a vendor key, if the engine implements it.
    #[must_use]
    pub fn to_engine_key(&self, canonical: &CanonicalRuleKey) -> Option<EngineRuleKey> {
        let engine = self.to_engine.get(canonical).cloned();
        if engine.is_none() {
            tracing::debug!(%canonical, "No engine rule for canonical key");
        }
        engine
    }

    /// Vendor key for an engine key. Engine-only rules keep their own name.
    #[must_use]
    pub fn to_canonical_key(&self, engine: &EngineRuleKey) -> CanonicalRuleKey {
        self.to_canonical
            .get(engine)
            .cloned()
            .unwrap_or_else(|| CanonicalRuleKey::new(engine.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.to_engine.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_engine.is_empty()
    }

    /// Mapping entries sorted by canonical key.
    #[must_use]
    pub fn entries(&self) -> Vec<(&CanonicalRuleKey, &EngineRuleKey)> {
        let mut entries: Vec<_> = self.to_engine.iter().collect();
        entries.sort();
        entries
    }

    #[must_use]
    pub fn forward_len(&self) -> usize {
        self.to_engine.len()
    }

    #[must_use]
    pub fn backward_len(&self) -> usize {
        self.to_canonical.len()
    }
}

/// One translator per engine version.
#[derive(Default)]
pub struct RuleKeyCache {
    cached: Mutex<Option<(String, Arc<RuleKeyTranslator>)>>,
}

impl RuleKeyCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The translator for `version`, scanning `rules_dir` only when the
    /// version differs from the cached one.
    pub fn get_or_build(&self, version: &str, rules_dir: &Path) -> Arc<RuleKeyTranslator> {
        let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((cached_version, translator)) = cached.as_ref()
            && cached_version == version
        {
            return Arc::clone(translator);
        }
        tracing::debug!(version, "Building rule key mapping");
        let translator = Arc::new(RuleKeyTranslator::generate_mapping(rules_dir));
        *cached = Some((version.to_string(), Arc::clone(&translator)));
        translator
    }
}
