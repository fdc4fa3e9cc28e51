use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable vendor rule identifier (e.g. `S1481`).
///
/// Rules that only exist in the engine use their engine name here, so the
/// value is not guaranteed to carry the `S` prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalRuleKey(String);

impl CanonicalRuleKey {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Build the canonical key for a numeric RSPEC id.
    #[must_use]
    pub fn from_rspec_number(number: &str) -> Self {
        Self(format!("S{number}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalRuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CanonicalRuleKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Rule name used by the analysis engine (e.g. `no-unused-vars`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EngineRuleKey(String);

impl EngineRuleKey {
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EngineRuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EngineRuleKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// An engine rule together with its ordered configuration parameters.
///
/// Serializes as the `rules[]` element of the `init-linter` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub key: EngineRuleKey,
    #[serde(default)]
    pub configurations: Vec<serde_json::Value>,
}

impl RuleConfig {
    /// A rule with no configuration parameters.
    #[must_use]
    pub fn new(key: EngineRuleKey) -> Self {
        Self {
            key,
            configurations: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_configurations(key: EngineRuleKey, configurations: Vec<serde_json::Value>) -> Self {
        Self {
            key,
            configurations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_key_from_rspec_number() {
        assert_eq!(CanonicalRuleKey::from_rspec_number("1481").as_str(), "S1481");
    }

    #[test]
    fn rule_config_wire_shape() {
        let rule = RuleConfig::with_configurations(
            EngineRuleKey::new("max-switch-cases"),
            vec![serde_json::json!({ "maximum": 30 })],
        );
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(json["key"], "max-switch-cases");
        assert_eq!(json["configurations"][0]["maximum"], 30);
    }

    #[test]
    fn rule_config_defaults_to_no_configurations() {
        let rule: RuleConfig = serde_json::from_str(r#"{"key":"no-debugger"}"#).unwrap();
        assert!(rule.configurations.is_empty());
        assert_eq!(rule.key, EngineRuleKey::new("no-debugger"));
    }
}
