//! Reference implementations of the [`ConfigBuilder`] port.
//!
//! The builders share descriptor parsing and the rule catalog below; each one
//! only decides how nodes, groups and rules are spelled in its format.
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};

use self::proxy::ProxyNode;
use crate::{
    core::BuilderRegistry,
    ports::config_builder::{BuildError, ConfigBuilder, FormatOptions, TargetFormat},
};

pub mod clash;
pub mod proxy;
pub mod singbox;
pub mod surge;

pub use clash::ClashBuilder;
pub use singbox::SingboxBuilder;
pub use surge::SurgeBuilder;

/// Group every generated rule group offers first
pub const NODE_SELECT: &str = "Node Select";
/// Group for traffic no rule matched
pub const FALL_BACK: &str = "Fall Back";

/// Remote rule-set sources, `{name}` is the geosite/geoip name
pub const SITE_RULE_SET_URL: &str =
    "https://raw.githubusercontent.com/MetaCubeX/meta-rules-dat/sing/geo/geosite/{name}.srs";
pub const IP_RULE_SET_URL: &str =
    "https://raw.githubusercontent.com/MetaCubeX/meta-rules-dat/sing/geo/geoip/{name}.srs";
pub const SITE_LIST_URL: &str =
    "https://raw.githubusercontent.com/MetaCubeX/meta-rules-dat/meta/geo/geosite/{name}.list";
pub const IP_LIST_URL: &str =
    "https://raw.githubusercontent.com/MetaCubeX/meta-rules-dat/meta/geo/geoip/{name}.list";

/// Geosite and geoip names behind a named rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleTarget {
    pub name: &'static str,
    pub site_rules: &'static [&'static str],
    pub ip_rules: &'static [&'static str],
}

const RULE_TARGETS: &[RuleTarget] = &[
    RuleTarget { name: "Ad Block", site_rules: &["category-ads-all"], ip_rules: &[] },
    RuleTarget { name: "AI Services", site_rules: &["category-ai-!cn"], ip_rules: &[] },
    RuleTarget { name: "Bilibili", site_rules: &["bilibili"], ip_rules: &[] },
    RuleTarget { name: "Youtube", site_rules: &["youtube"], ip_rules: &[] },
    RuleTarget { name: "Google", site_rules: &["google"], ip_rules: &["google"] },
    RuleTarget { name: "Private", site_rules: &[], ip_rules: &["private"] },
    RuleTarget { name: "Location:CN", site_rules: &["geolocation-cn"], ip_rules: &["cn"] },
    RuleTarget { name: "Telegram", site_rules: &[], ip_rules: &["telegram"] },
    RuleTarget { name: "Github", site_rules: &["github", "gitlab"], ip_rules: &[] },
    RuleTarget { name: "Microsoft", site_rules: &["microsoft"], ip_rules: &[] },
    RuleTarget { name: "Apple", site_rules: &["apple"], ip_rules: &[] },
    RuleTarget {
        name: "Social Media",
        site_rules: &["facebook", "instagram", "twitter", "tiktok", "linkedin"],
        ip_rules: &[],
    },
    RuleTarget {
        name: "Streaming",
        site_rules: &["netflix", "hulu", "disney", "hbo", "amazon", "bahamut"],
        ip_rules: &[],
    },
    RuleTarget {
        name: "Gaming",
        site_rules: &["steam", "epicgames", "ea", "ubisoft", "blizzard"],
        ip_rules: &[],
    },
    RuleTarget {
        name: "Education",
        site_rules: &["coursera", "edx", "udemy", "khanacademy", "category-scholar-!cn"],
        ip_rules: &[],
    },
    RuleTarget {
        name: "Financial",
        site_rules: &["paypal", "visa", "mastercard", "stripe", "wise"],
        ip_rules: &[],
    },
    RuleTarget {
        name: "Cloud Services",
        site_rules: &["aws", "azure", "digitalocean", "heroku", "dropbox"],
        ip_rules: &[],
    },
    RuleTarget { name: "Non-China", site_rules: &["geolocation-!cn"], ip_rules: &[] },
];

impl RuleTarget {
    pub fn lookup(name: &str) -> Option<&'static RuleTarget> {
        RULE_TARGETS.iter().find(|target| target.name == name)
    }

    /// Preferred first choice of the rule's selector group
    pub fn default_outbound(&self) -> &'static str {
        match self.name {
            "Location:CN" | "Private" | "Bilibili" => "DIRECT",
            "Ad Block" => "REJECT",
            _ => NODE_SELECT,
        }
    }
}

/// Known rule targets for a selected rule list; unknown names and non-string
/// entries are dropped.
pub fn selected_targets(rules: &[Value]) -> Vec<&'static RuleTarget> {
    rules
        .iter()
        .filter_map(|rule| match rule.as_str().and_then(RuleTarget::lookup) {
            Some(target) => Some(target),
            None => {
                tracing::debug!("Ignoring unknown rule entry: {}", rule);
                None
            }
        })
        .collect()
}

/// A user defined rule routed to its own selector group
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CustomRule {
    pub name: String,
    #[serde(default)]
    pub domain_suffix: String,
    #[serde(default)]
    pub domain_keyword: String,
    #[serde(default)]
    pub ip_cidr: String,
}

impl CustomRule {
    pub fn domain_suffixes(&self) -> Vec<&str> {
        split_list(&self.domain_suffix)
    }

    pub fn domain_keywords(&self) -> Vec<&str> {
        split_list(&self.domain_keyword)
    }

    pub fn ip_cidrs(&self) -> Vec<&str> {
        split_list(&self.ip_cidr)
    }
}

/// Custom rules that deserialize and carry a name
pub fn custom_rules(rules: &[Value]) -> Vec<CustomRule> {
    rules
        .iter()
        .filter_map(|rule| match CustomRule::deserialize(rule) {
            Ok(custom) if !custom.name.trim().is_empty() => Some(custom),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!("Ignoring malformed custom rule {}: {}", rule, e);
                None
            }
        })
        .collect()
}

fn split_list(raw: &str) -> Vec<&str> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .collect()
}

/// Members of a rule selector group: `first`, the fixed outbounds, then every node
pub fn rule_group_members(first: &str, nodes: &[ProxyNode]) -> Vec<String> {
    let mut members = vec![first.to_string()];
    for fixed in [NODE_SELECT, "DIRECT", "REJECT"] {
        if fixed != first {
            members.push(fixed.to_string());
        }
    }
    members.extend(nodes.iter().map(|node| node.name.clone()));
    members
}

/// Members of the `Node Select` group
pub fn node_select_members(nodes: &[ProxyNode]) -> Vec<String> {
    nodes
        .iter()
        .map(|node| node.name.clone())
        .chain(std::iter::once("DIRECT".to_string()))
        .collect()
}

pub fn rule_set_url(template: &str, name: &str) -> String {
    template.replace("{name}", name)
}

/// The stored base config as an object, or `default` when none was supplied
pub fn base_object(
    base_config: Option<Value>,
    default: impl FnOnce() -> Map<String, Value>,
) -> Result<Map<String, Value>, BuildError> {
    match base_config {
        None => Ok(default()),
        Some(Value::Object(map)) => Ok(map),
        Some(other) => Err(BuildError::InvalidBaseConfig(format!(
            "expected an object, got {}",
            value_kind(&other)
        ))),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

pub fn ensure_format(expected: TargetFormat, options: &FormatOptions) -> Result<(), BuildError> {
    let actual = options.format();
    if actual == expected {
        Ok(())
    } else {
        Err(BuildError::FormatMismatch { expected, actual })
    }
}

/// Registry wired with the reference builders
pub fn reference_registry() -> BuilderRegistry {
    let singbox: Arc<dyn ConfigBuilder> = Arc::new(SingboxBuilder);
    let clash: Arc<dyn ConfigBuilder> = Arc::new(ClashBuilder);
    let surge: Arc<dyn ConfigBuilder> = Arc::new(SurgeBuilder);
    BuilderRegistry::new(singbox, clash, surge)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::core::rules::{RuleSetResolver, UNIFIED_RULES};

    #[test]
    fn test_every_unified_rule_has_a_target() {
        for name in UNIFIED_RULES {
            assert!(RuleTarget::lookup(name).is_some(), "{name} has no target");
        }
        let comprehensive = RuleSetResolver::predefined("comprehensive").unwrap();
        assert_eq!(selected_targets(&comprehensive).len(), UNIFIED_RULES.len());
    }

    #[test]
    fn test_unknown_rules_are_dropped() {
        let targets = selected_targets(&[json!("Youtube"), json!("Nope"), json!(42)]);
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].name, "Youtube");
    }

    #[test]
    fn test_custom_rules() {
        let rules = custom_rules(&[
            json!({"name": "Work", "domain_suffix": "corp.com, corp.net", "ip_cidr": "10.0.0.0/8"}),
            json!({"domain_suffix": "no-name.com"}),
            json!("not an object"),
        ]);
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].domain_suffixes(), vec!["corp.com", "corp.net"]);
        assert!(rules[0].domain_keywords().is_empty());
        assert_eq!(rules[0].ip_cidrs(), vec!["10.0.0.0/8"]);
    }

    #[test]
    fn test_base_object() {
        let base = base_object(Some(json!({"a": 1})), Map::new).unwrap();
        assert_eq!(base.get("a"), Some(&json!(1)));
        assert!(base_object(None, Map::new).unwrap().is_empty());
        assert!(matches!(
            base_object(Some(json!([1])), Map::new),
            Err(BuildError::InvalidBaseConfig(_))
        ));
    }

    #[test]
    fn test_group_members() {
        let nodes = proxy::parse_descriptors(&["trojan://pw@a.example.com:443#A".to_string()]);
        assert_eq!(
            rule_group_members("DIRECT", &nodes),
            vec!["DIRECT", NODE_SELECT, "REJECT", "A"]
        );
        assert_eq!(node_select_members(&nodes), vec!["A", "DIRECT"]);
        assert_eq!(node_select_members(&[]), vec!["DIRECT"]);
    }

    #[test]
    fn test_format_guard() {
        assert!(ensure_format(TargetFormat::Clash, &FormatOptions::Clash).is_ok());
        assert!(matches!(
            ensure_format(TargetFormat::Singbox, &FormatOptions::Clash),
            Err(BuildError::FormatMismatch { .. })
        ));
    }
}
