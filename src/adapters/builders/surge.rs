use std::fmt::Write as _;

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use super::{
    FALL_BACK, IP_LIST_URL, NODE_SELECT, SITE_LIST_URL, base_object, custom_rules,
    node_select_members,
    proxy::{Protocol, ProxyNode, parse_descriptors},
    rule_group_members, rule_set_url, selected_targets,
};
use crate::ports::config_builder::{
    BuildError, BuildRequest, BuiltConfig, ConfigBuilder, FormatOptions, TargetFormat,
};

/// Surge re-fetches a managed profile after this many seconds
const MANAGED_INTERVAL_SECS: u64 = 43200;

/// Builds Surge profiles
#[derive(Debug, Default, Clone, Copy)]
pub struct SurgeBuilder;

fn default_base() -> Map<String, Value> {
    let base = json!({
        "general": {
            "loglevel": "notify",
            "dns-server": "system, 223.5.5.5, 119.29.29.29",
            "skip-proxy": "127.0.0.1, 192.168.0.0/16, 10.0.0.0/8, 172.16.0.0/12, localhost, *.local",
            "allow-wifi-access": false,
            "ipv6": false
        }
    });

    match base {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// `[General]` from `general`, `[Proxy Group]` from `proxy-group`
fn section_title(key: &str) -> String {
    if key.eq_ignore_ascii_case("mitm") {
        return "MITM".to_string();
    }
    key.split(['-', '_'])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(scalar).collect::<Vec<_>>().join(", "),
        other => other.to_string(),
    }
}

/// Lines of a base config section: objects become `key = value`, arrays are raw lines
fn section_lines(value: &Value) -> Vec<String> {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(key, value)| format!("{key} = {}", scalar(value)))
            .collect(),
        Value::Array(items) => items.iter().map(scalar).collect(),
        other => vec![scalar(other)],
    }
}

/// Surge proxy line, `None` for protocols Surge cannot express
fn proxy_line(node: &ProxyNode) -> Option<String> {
    let name = &node.name;
    let mut line = match node.protocol() {
        Protocol::Shadowsocks => format!(
            "{name} = ss, {}, {}, encrypt-method={}, password={}",
            node.server,
            node.port,
            node.cipher.as_deref().unwrap_or_default(),
            node.password.as_deref().unwrap_or_default()
        ),
        Protocol::Vmess => format!(
            "{name} = vmess, {}, {}, username={}",
            node.server,
            node.port,
            node.uuid.as_deref().unwrap_or_default()
        ),
        Protocol::Trojan => format!(
            "{name} = trojan, {}, {}, password={}",
            node.server,
            node.port,
            node.password.as_deref().unwrap_or_default()
        ),
        Protocol::Hysteria2 => format!(
            "{name} = hysteria2, {}, {}, password={}",
            node.server,
            node.port,
            node.password.as_deref().unwrap_or_default()
        ),
        Protocol::Tuic => format!(
            "{name} = tuic-v5, {}, {}, password={}, uuid={}",
            node.server,
            node.port,
            node.password.as_deref().unwrap_or_default(),
            node.uuid.as_deref().unwrap_or_default()
        ),
        Protocol::Vless => return None,
    };

    if node.protocol() == Protocol::Vmess && node.tls {
        line.push_str(", tls=true");
    }
    if let Some(sni) = &node.sni {
        let _ = write!(line, ", sni={sni}");
    }
    if node.insecure {
        line.push_str(", skip-cert-verify=true");
    }
    if node.network.as_deref() == Some("ws") {
        let _ = write!(line, ", ws=true, ws-path={}", node.path.as_deref().unwrap_or("/"));
        if let Some(host) = &node.host {
            let _ = write!(line, ", ws-headers=Host:{host}");
        }
    }

    Some(line)
}

fn group_line(name: &str, members: &[String]) -> String {
    format!("{name} = select, {}", members.join(", "))
}

fn ip_rule(ip: &str, group: &str) -> String {
    if ip == "cn" {
        format!("GEOIP,CN,{group}")
    } else {
        format!("RULE-SET,{},{group},no-resolve", rule_set_url(IP_LIST_URL, ip))
    }
}

fn take_lines(map: &mut Map<String, Value>, key: &str) -> Vec<String> {
    map.remove(key)
        .map(|value| section_lines(&value))
        .unwrap_or_default()
}

#[async_trait]
impl ConfigBuilder for SurgeBuilder {
    async fn build(&self, request: BuildRequest) -> Result<BuiltConfig, BuildError> {
        let FormatOptions::Surge { subscription_url } = &request.options else {
            return Err(BuildError::FormatMismatch {
                expected: TargetFormat::Surge,
                actual: request.options.format(),
            });
        };

        let mut lines_by_node = Vec::new();
        let mut nodes = Vec::new();
        for mut node in parse_descriptors(&request.subscription) {
            // `,` and `=` are separators in Surge lines
            node.name = node.name.replace([',', '='], " ");
            match proxy_line(&node) {
                Some(line) => {
                    lines_by_node.push(line);
                    nodes.push(node);
                }
                None => tracing::debug!("Surge has no equivalent for node {}", node.name),
            }
        }

        let targets = selected_targets(&request.rules);
        let customs = custom_rules(&request.custom_rules);
        let mut base = base_object(request.base_config, default_base)?;

        let mut proxies = vec!["DIRECT = direct".to_string()];
        proxies.extend(lines_by_node);
        proxies.extend(take_lines(&mut base, "proxy"));

        let mut groups = vec![group_line(NODE_SELECT, &node_select_members(&nodes))];
        groups.extend(
            targets
                .iter()
                .map(|t| group_line(t.name, &rule_group_members(t.default_outbound(), &nodes))),
        );
        groups.extend(
            customs
                .iter()
                .map(|c| group_line(&c.name, &rule_group_members(NODE_SELECT, &nodes))),
        );
        groups.push(group_line(FALL_BACK, &rule_group_members(NODE_SELECT, &nodes)));
        groups.extend(take_lines(&mut base, "proxy-group"));

        let mut rules: Vec<String> = take_lines(&mut base, "rule")
            .into_iter()
            .filter(|rule| !rule.starts_with("FINAL,"))
            .collect();
        for custom in &customs {
            rules.extend(
                custom
                    .domain_suffixes()
                    .into_iter()
                    .map(|d| format!("DOMAIN-SUFFIX,{d},{}", custom.name)),
            );
            rules.extend(
                custom
                    .domain_keywords()
                    .into_iter()
                    .map(|k| format!("DOMAIN-KEYWORD,{k},{}", custom.name)),
            );
            rules.extend(
                custom
                    .ip_cidrs()
                    .into_iter()
                    .map(|ip| format!("IP-CIDR,{ip},{},no-resolve", custom.name)),
            );
        }
        for target in &targets {
            rules.extend(
                target
                    .site_rules
                    .iter()
                    .map(|site| format!("RULE-SET,{},{}", rule_set_url(SITE_LIST_URL, site), target.name)),
            );
            rules.extend(target.ip_rules.iter().map(|ip| ip_rule(ip, target.name)));
        }
        rules.push(format!("FINAL,{FALL_BACK}"));

        let mut profile = format!(
            "#!MANAGED-CONFIG {subscription_url} interval={MANAGED_INTERVAL_SECS} strict=false\n"
        );
        let general = take_lines(&mut base, "general");
        let mut sections: Vec<(String, Vec<String>)> = vec![("General".to_string(), general)];
        sections.extend(
            base.iter()
                .map(|(key, value)| (section_title(key), section_lines(value))),
        );
        sections.push(("Proxy".to_string(), proxies));
        sections.push(("Proxy Group".to_string(), groups));
        sections.push(("Rule".to_string(), rules));

        for (title, lines) in sections {
            let _ = write!(profile, "\n[{title}]\n");
            for line in lines {
                profile.push_str(&line);
                profile.push('\n');
            }
        }

        tracing::debug!("Built Surge profile with {} nodes", nodes.len());
        Ok(BuiltConfig::Text(profile))
    }
}
