//! Rule-set resolution.
//!
//! `selectedRules` is either a key of the predefined catalog or a URL/JSON
//! encoded rule list, and never fails: anything unusable resolves to the
//! catalog's default entry. `customRules` is always a URL/JSON encoded list and
//! resolves to an empty list when unusable. The two fallbacks are deliberately
//! different.
use serde_json::Value;
use thiserror::Error;

use crate::core::codec::percent_decode;

/// Ordered, opaque rule entries. Interpretation belongs to the builders.
pub type RuleList = Vec<Value>;

/// Catalog key used whenever `selectedRules` cannot be resolved
pub const DEFAULT_RULE_SET: &str = "minimal";

const MINIMAL: &[&str] = &["Location:CN", "Private", "Non-China"];

const BALANCED: &[&str] = &[
    "Location:CN",
    "Private",
    "Non-China",
    "Github",
    "Google",
    "Youtube",
    "AI Services",
    "Telegram",
];

/// Every rule known to the reference builders, in routing order
pub const UNIFIED_RULES: &[&str] = &[
    "Ad Block",
    "AI Services",
    "Bilibili",
    "Youtube",
    "Google",
    "Private",
    "Location:CN",
    "Telegram",
    "Github",
    "Microsoft",
    "Apple",
    "Social Media",
    "Streaming",
    "Gaming",
    "Education",
    "Financial",
    "Cloud Services",
    "Non-China",
];

const PREDEFINED_RULE_SETS: &[(&str, &[&str])] = &[
    ("minimal", MINIMAL),
    ("balanced", BALANCED),
    ("comprehensive", UNIFIED_RULES),
];

#[derive(Error, Debug)]
enum RuleDecodeError {
    #[error(transparent)]
    Decode(#[from] crate::core::codec::DecodeError),

    #[error("Invalid rule list JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Both rule lists handed to a builder
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResolvedRules {
    pub selected: RuleList,
    pub custom: RuleList,
}

pub struct RuleSetResolver;

impl RuleSetResolver {
    /// Names of the predefined rule sets
    pub fn catalog_keys() -> impl Iterator<Item = &'static str> {
        PREDEFINED_RULE_SETS.iter().map(|(name, _)| *name)
    }

    /// Exact-key catalog lookup
    pub fn predefined(name: &str) -> Option<RuleList> {
        PREDEFINED_RULE_SETS
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, rules)| rules.iter().map(|rule| Value::from(*rule)).collect())
    }

    pub fn default_rules() -> RuleList {
        Self::predefined(DEFAULT_RULE_SET).unwrap_or_default()
    }

    pub fn resolve(selected: Option<&str>, custom: Option<&str>) -> ResolvedRules {
        ResolvedRules {
            selected: Self::resolve_selected(selected),
            custom: Self::resolve_custom(custom),
        }
    }

    pub fn resolve_selected(token: Option<&str>) -> RuleList {
        let Some(token) = token else {
            return Self::default_rules();
        };

        if let Some(rules) = Self::predefined(token) {
            return rules;
        }

        decode_rule_list(token).unwrap_or_else(|e| {
            tracing::debug!("Falling back to '{DEFAULT_RULE_SET}' rule set: {e}");
            Self::default_rules()
        })
    }

    pub fn resolve_custom(token: Option<&str>) -> RuleList {
        let Some(token) = token else {
            return RuleList::new();
        };

        decode_rule_list(token).unwrap_or_else(|e| {
            tracing::debug!("Ignoring custom rules: {e}");
            RuleList::new()
        })
    }
}

/// URL-decode, then parse as a JSON array
fn decode_rule_list(token: &str) -> Result<RuleList, RuleDecodeError> {
    let decoded = percent_decode(token)?;
    Ok(serde_json::from_str::<RuleList>(&decoded)?)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_every_catalog_key_resolves_to_its_list() {
        for key in RuleSetResolver::catalog_keys() {
            let expected = RuleSetResolver::predefined(key).unwrap();
            assert_eq!(RuleSetResolver::resolve_selected(Some(key)), expected);
            assert_eq!(RuleSetResolver::resolve_selected(Some(key)), expected);
        }
        assert_eq!(
            RuleSetResolver::predefined("comprehensive").unwrap().len(),
            UNIFIED_RULES.len()
        );
    }

    #[test]
    fn test_literal_selected_list() {
        let encoded = urlencoding::encode(r#"["Google","Github"]"#).into_owned();
        assert_eq!(
            RuleSetResolver::resolve_selected(Some(&encoded)),
            vec![json!("Google"), json!("Github")]
        );
        // already decoded by the query parser
        assert_eq!(
            RuleSetResolver::resolve_selected(Some(r#"["Apple"]"#)),
            vec![json!("Apple")]
        );
    }

    #[test]
    fn test_invalid_selected_falls_back_to_default() {
        let default = RuleSetResolver::default_rules();
        assert_eq!(default, vec![json!("Location:CN"), json!("Private"), json!("Non-China")]);

        for token in ["", "Minimal", "[\"unterminated", "{\"a\":1}", "42", "%FF%FE"] {
            assert_eq!(RuleSetResolver::resolve_selected(Some(token)), default, "{token}");
        }
        assert_eq!(RuleSetResolver::resolve_selected(None), default);
    }

    #[test]
    fn test_invalid_custom_is_empty_not_default() {
        for token in ["", "minimal", "not json", "{\"name\":\"x\"}"] {
            assert!(RuleSetResolver::resolve_custom(Some(token)).is_empty(), "{token}");
        }
        assert!(RuleSetResolver::resolve_custom(None).is_empty());
    }

    #[test]
    fn test_custom_rules_keep_order_and_shape() {
        let raw = r#"[{"name":"Work","domain_suffix":"corp.example"},{"name":"Home","ip_cidr":"10.0.0.0/8"}]"#;
        let encoded = urlencoding::encode(raw).into_owned();

        let resolved = RuleSetResolver::resolve(Some("balanced"), Some(&encoded));
        assert_eq!(resolved.selected.len(), 8);
        assert_eq!(resolved.custom[0]["name"], "Work");
        assert_eq!(resolved.custom[1]["ip_cidr"], "10.0.0.0/8");
    }
}
