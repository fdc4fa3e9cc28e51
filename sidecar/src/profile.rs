//! Quality profiles and their translation into engine rule sets.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};

use lintbridge_types::{CanonicalRuleKey, Language, RuleConfig};

use crate::error::BridgeError;
use crate::rules::RuleKeyTranslator;

/// A named set of activated vendor rules for one language.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QualityProfile {
    pub language: Language,
    pub name: String,
    #[serde(default)]
    pub rules: Vec<ProfileRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRule {
    pub repository_key: String,
    pub key: CanonicalRuleKey,
    #[serde(default)]
    pub parameters: Vec<RuleParameter>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RuleParameter {
    pub key: String,
    pub value: String,
}

impl QualityProfile {
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    /// A profile activating every rule the translator knows, unparameterized.
    #[must_use]
    pub fn all_mapped(language: Language, translator: &RuleKeyTranslator) -> Self {
        let rules = translator
            .entries()
            .into_iter()
            .map(|(canonical, _)| ProfileRule {
                repository_key: language.repository().to_string(),
                key: canonical.clone(),
                parameters: Vec::new(),
            })
            .collect();
        Self {
            language,
            name: "all mapped rules".to_string(),
            rules,
        }
    }
}

/// Turns quality profiles into `init-linter` rule lists.
pub struct RulesProvider {
    translator: Arc<RuleKeyTranslator>,
    excluded: HashSet<CanonicalRuleKey>,
}

impl RulesProvider {
    #[must_use]
    pub fn new(
        translator: Arc<RuleKeyTranslator>,
        excluded: impl IntoIterator<Item = CanonicalRuleKey>,
    ) -> Self {
        Self {
            translator,
            excluded: excluded.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn translator(&self) -> &Arc<RuleKeyTranslator> {
        &self.translator
    }

    /// Engine rules for every translatable, non-excluded rule of `profile`,
    /// in profile order.
    #[must_use]
    pub fn engine_rules(&self, profile: &QualityProfile) -> Vec<RuleConfig> {
        let rules: Vec<RuleConfig> = profile
            .rules
            .iter()
            .filter_map(|rule| match self.engine_rule(rule) {
                Ok(config) => config,
                Err(e) => {
                    tracing::debug!(profile = %profile.name, "Dropping rule: {e}");
                    None
                }
            })
            .collect();
        tracing::info!(
            profile = %profile.name,
            language = %profile.language,
            active = rules.len(),
            total = profile.rules.len(),
            "Translated quality profile"
        );
        rules
    }

    fn engine_rule(&self, rule: &ProfileRule) -> Result<Option<RuleConfig>, BridgeError> {
        if self.excluded.contains(&rule.key) {
            tracing::debug!(rule = %rule.key, "Rule is excluded");
            return Ok(None);
        }
        let key = self
            .translator
            .to_engine_key(&rule.key)
            .ok_or_else(|| BridgeError::RuleMappingMiss(rule.key.clone()))?;

        if rule.parameters.is_empty() {
            return Ok(Some(RuleConfig::new(key)));
        }
        let options: Map<String, Value> = rule
            .parameters
            .iter()
            .map(|param| (param.key.clone(), parameter_value(&param.value)))
            .collect();
        tracing::debug!(rule = %rule.key, engine = %key, ?options, "Parameterized rule");
        Ok(Some(RuleConfig::with_configurations(
            key,
            vec![Value::Object(options)],
        )))
    }
}

/// Profiles carry every parameter as a string; the engine expects numbers
/// and booleans to be typed.
fn parameter_value(raw: &str) -> Value {
    match raw {
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        _ => {
            if let Ok(int) = raw.parse::<i64>() {
                return Value::from(int);
            }
            if let Ok(float) = raw.parse::<f64>()
                && float.is_finite()
            {
                return Value::from(float);
            }
            Value::String(raw.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serde_json::json;

    use super::*;
    use lintbridge_types::EngineRuleKey;

    fn translator() -> Arc<RuleKeyTranslator> {
        let dir = tempfile::tempdir().unwrap();
        for (file, number) in [
            ("no-unused-vars.js", 1481),
            ("max-switch-cases.js", 1479),
            ("class-name.js", 101),
            ("no-debugger.js", 1525),
        ] {
            fs::write(
                dir.path().join(file),
                format!("// https://jira.sonarsource.com/browse/RSPEC-{number}\n"),
            )
            .unwrap();
        }
        Arc::new(RuleKeyTranslator::generate_mapping(dir.path()))
    }

    fn profile() -> QualityProfile {
        QualityProfile::from_json(
            &json!({
                "language": "javascript",
                "name": "Sonar way",
                "rules": [
                    { "repositoryKey": "javascript", "key": "S1481" },
                    {
                        "repositoryKey": "javascript",
                        "key": "S1479",
                        "parameters": [{ "key": "maximum", "value": "30" }]
                    },
                    {
                        "repositoryKey": "javascript",
                        "key": "S101",
                        "parameters": [{ "key": "format", "value": "^[A-Z][a-zA-Z0-9]*$" }]
                    },
                    { "repositoryKey": "javascript", "key": "S9999" },
                    { "repositoryKey": "javascript", "key": "S1525" }
                ]
            })
            .to_string(),
        )
        .unwrap()
    }

    #[test]
    fn profile_deserializes() {
        let profile = profile();
        assert_eq!(profile.language, Language::JavaScript);
        assert_eq!(profile.rules.len(), 5);
        assert_eq!(profile.rules[1].parameters[0].key, "maximum");
        assert!(profile.rules[0].parameters.is_empty());
    }

    #[test]
    fn translates_rules_and_drops_misses_and_exclusions() {
        let provider = RulesProvider::new(translator(), [CanonicalRuleKey::new("S1525")]);
        let rules = provider.engine_rules(&profile());

        let keys: Vec<&str> = rules.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, ["no-unused-vars", "max-switch-cases", "class-name"]);
        assert!(rules[0].configurations.is_empty());
    }

    #[test]
    fn parameters_become_one_typed_configuration_object() {
        let provider = RulesProvider::new(translator(), []);
        let rules = provider.engine_rules(&profile());

        let max_cases = rules
            .iter()
            .find(|r| r.key == EngineRuleKey::new("max-switch-cases"))
            .unwrap();
        assert_eq!(max_cases.configurations, vec![json!({ "maximum": 30 })]);

        let class_name = rules
            .iter()
            .find(|r| r.key == EngineRuleKey::new("class-name"))
            .unwrap();
        assert_eq!(
            class_name.configurations,
            vec![json!({ "format": "^[A-Z][a-zA-Z0-9]*$" })]
        );
    }

    #[test]
    fn parameter_values_are_typed() {
        assert_eq!(parameter_value("true"), json!(true));
        assert_eq!(parameter_value("false"), json!(false));
        assert_eq!(parameter_value("42"), json!(42));
        assert_eq!(parameter_value("0.5"), json!(0.5));
        assert_eq!(parameter_value("NaN"), json!("NaN"));
        assert_eq!(parameter_value("node_modules"), json!("node_modules"));
    }

    #[test]
    fn all_mapped_profile_covers_translator() {
        let translator = translator();
        let profile = QualityProfile::all_mapped(Language::TypeScript, &translator);
        assert_eq!(profile.rules.len(), translator.len());
        assert!(profile.rules.iter().all(|r| r.repository_key == "typescript"));

        let provider = RulesProvider::new(translator, []);
        assert_eq!(provider.engine_rules(&profile).len(), 4);
    }
}
