//! Global-variable settings sent with every `init-linter` request.
//!
//! Two named settings feed the linter session: the recognised environments
//! (each contributes a predefined set of globals inside the engine) and ad
//! hoc global names. Both are comma-separated lists.

use std::env;

use crate::LinterConfig;

pub const ENVIRONMENTS_PROPERTY_KEY: &str = "sonar.javascript.environments";
pub const GLOBALS_PROPERTY_KEY: &str = "sonar.javascript.globals";

pub const DEFAULT_ENVIRONMENTS: &str = "amd, applescript, atomtest, browser, commonjs, couch, embertest, flow, greasemonkey, jasmine, jest, jquery, \
     meteor, mocha, mongo, nashorn, node, phantomjs, prototypejs, protractor, qunit, rhino, serviceworker, shared-node-browser, shelljs, webextensions, worker, wsh, yui";

pub const DEFAULT_GLOBALS: &str =
    "angular,goog,google,OpenLayers,d3,dojo,dojox,dijit,Backbone,moment,casper";

/// Split a comma-separated setting, trimming whitespace and dropping empties.
#[must_use]
pub fn split_setting(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}

/// Shell-friendly alias for a dotted property key
/// (`sonar.javascript.globals` → `SONAR_JAVASCRIPT_GLOBALS`).
fn env_alias(property_key: &str) -> String {
    property_key.replace('.', "_").to_ascii_uppercase()
}

/// Resolved environments and globals for the linter session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinterGlobals {
    environments: Vec<String>,
    globals: Vec<String>,
}

impl Default for LinterGlobals {
    fn default() -> Self {
        Self {
            environments: split_setting(DEFAULT_ENVIRONMENTS),
            globals: split_setting(DEFAULT_GLOBALS),
        }
    }
}

impl LinterGlobals {
    #[must_use]
    pub fn new(environments: Vec<String>, globals: Vec<String>) -> Self {
        Self {
            environments,
            globals,
        }
    }

    /// Resolve both settings from the process environment, then the config
    /// file, then the built-in defaults.
    #[must_use]
    pub fn from_env(config: &LinterConfig) -> Self {
        Self::resolve(config, |key| env::var(key).ok())
    }

    /// Resolve both settings through an arbitrary named-setting lookup.
    ///
    /// The lookup is asked for the dotted property key first, then for its
    /// upper-case underscore alias.
    pub fn resolve(config: &LinterConfig, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let lookup_setting = |key: &str| lookup(key).or_else(|| lookup(&env_alias(key)));

        let environments = lookup_setting(ENVIRONMENTS_PROPERTY_KEY)
            .map(|raw| split_setting(&raw))
            .or_else(|| config.environments.clone())
            .unwrap_or_else(|| split_setting(DEFAULT_ENVIRONMENTS));

        let globals = lookup_setting(GLOBALS_PROPERTY_KEY)
            .map(|raw| split_setting(&raw))
            .or_else(|| config.globals.clone())
            .unwrap_or_else(|| split_setting(DEFAULT_GLOBALS));

        Self {
            environments,
            globals,
        }
    }

    #[must_use]
    pub fn environments(&self) -> &[String] {
        &self.environments
    }

    #[must_use]
    pub fn globals(&self) -> &[String] {
        &self.globals
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn split_setting_trims_and_drops_empty() {
        assert_eq!(split_setting(" a, b ,,c "), vec!["a", "b", "c"]);
        assert!(split_setting("").is_empty());
    }

    #[test]
    fn defaults_are_split() {
        let globals = LinterGlobals::default();
        assert_eq!(globals.environments().len(), 29);
        assert_eq!(globals.environments()[0], "amd");
        assert_eq!(globals.environments()[28], "yui");
        assert!(globals.environments().iter().all(|e| e.trim() == e));
        assert_eq!(globals.globals().len(), 11);
        assert_eq!(globals.globals()[0], "angular");
    }

    #[test]
    fn lookup_overrides_config_and_defaults() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENVIRONMENTS_PROPERTY_KEY, "node, jest"),
            ("SONAR_JAVASCRIPT_GLOBALS", "myGlobal"),
        ]);
        let config = LinterConfig {
            environments: Some(vec!["browser".to_string()]),
            globals: Some(vec!["fromFile".to_string()]),
        };
        let resolved = LinterGlobals::resolve(&config, |key| vars.get(key).map(|v| (*v).to_string()));
        assert_eq!(resolved.environments(), ["node", "jest"]);
        assert_eq!(resolved.globals(), ["myGlobal"]);
    }

    #[test]
    fn config_overrides_defaults() {
        let config = LinterConfig {
            environments: Some(vec!["browser".to_string()]),
            globals: None,
        };
        let resolved = LinterGlobals::resolve(&config, |_| None);
        assert_eq!(resolved.environments(), ["browser"]);
        assert_eq!(resolved, LinterGlobals::new(
            vec!["browser".to_string()],
            split_setting(DEFAULT_GLOBALS),
        ));
    }

    #[test]
    fn env_alias_is_shell_safe() {
        assert_eq!(env_alias(ENVIRONMENTS_PROPERTY_KEY), "SONAR_JAVASCRIPT_ENVIRONMENTS");
    }
}
