use async_trait::async_trait;
use serde_json::{Map, Value, json};

use super::{
    CustomRule, FALL_BACK, IP_RULE_SET_URL, NODE_SELECT, RuleTarget, SITE_RULE_SET_URL,
    base_object, custom_rules, ensure_format, node_select_members,
    proxy::{Protocol, ProxyNode, parse_descriptors},
    rule_group_members, rule_set_url, selected_targets,
};
use crate::ports::config_builder::{
    BuildError, BuildRequest, BuiltConfig, ConfigBuilder, TargetFormat,
};

/// Builds sing-box JSON configs
#[derive(Debug, Default, Clone, Copy)]
pub struct SingboxBuilder;

fn default_base() -> Map<String, Value> {
    let base = json!({
        "log": {"disabled": false, "level": "info", "timestamp": true},
        "dns": {
            "servers": [
                {"tag": "dns_direct", "address": "https://223.5.5.5/dns-query", "detour": "DIRECT"}
            ],
            "final": "dns_direct"
        },
        "inbounds": [
            {"type": "mixed", "tag": "mixed-in", "listen": "0.0.0.0", "listen_port": 2080},
            {
                "type": "tun",
                "tag": "tun-in",
                "address": ["172.19.0.1/30"],
                "auto_route": true,
                "strict_route": true,
                "stack": "mixed"
            }
        ],
        "outbounds": [
            {"type": "direct", "tag": "DIRECT"},
            {"type": "block", "tag": "REJECT"}
        ],
        "route": {},
        "experimental": {"cache_file": {"enabled": true}}
    });

    match base {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn selector(tag: &str, outbounds: Vec<String>) -> Value {
    json!({"type": "selector", "tag": tag, "outbounds": outbounds})
}

fn outbound(node: &ProxyNode) -> Value {
    let mut out = json!({
        "tag": node.name,
        "server": node.server,
        "server_port": node.port,
    });

    let fields = match node.protocol() {
        Protocol::Shadowsocks => json!({
            "type": "shadowsocks",
            "method": node.cipher,
            "password": node.password,
        }),
        Protocol::Vmess => json!({
            "type": "vmess",
            "uuid": node.uuid,
            "alter_id": node.alter_id,
            "security": "auto",
        }),
        Protocol::Vless => {
            let mut fields = json!({"type": "vless", "uuid": node.uuid});
            if let Some(flow) = &node.flow {
                fields["flow"] = json!(flow);
            }
            fields
        }
        Protocol::Trojan => json!({"type": "trojan", "password": node.password}),
        Protocol::Hysteria2 => json!({"type": "hysteria2", "password": node.password}),
        Protocol::Tuic => json!({
            "type": "tuic",
            "uuid": node.uuid,
            "password": node.password,
            "congestion_control": "bbr",
        }),
    };
    merge_into(&mut out, fields);

    if node.tls {
        out["tls"] = json!({
            "enabled": true,
            "server_name": node.sni.as_deref().or(node.host.as_deref()).unwrap_or(node.server.as_str()),
            "insecure": node.insecure,
        });
    }

    if let Some(transport) = transport(node) {
        out["transport"] = transport;
    }

    out
}

fn transport(node: &ProxyNode) -> Option<Value> {
    match node.network.as_deref()? {
        "ws" => {
            let mut ws = json!({"type": "ws", "path": node.path.as_deref().unwrap_or("/")});
            if let Some(host) = &node.host {
                ws["headers"] = json!({"Host": host});
            }
            Some(ws)
        }
        "grpc" => Some(json!({"type": "grpc", "service_name": node.path.as_deref().unwrap_or_default()})),
        "http" | "h2" => Some(json!({"type": "http", "path": node.path.as_deref().unwrap_or("/")})),
        other => {
            tracing::debug!("Unsupported transport {} on {}", other, node.name);
            None
        }
    }
}

fn merge_into(target: &mut Value, fields: Value) {
    if let (Value::Object(target), Value::Object(fields)) = (target, fields) {
        target.extend(fields);
    }
}

fn rule_set_tags(target: &RuleTarget) -> Vec<String> {
    target
        .site_rules
        .iter()
        .map(|site| format!("geosite-{site}"))
        .chain(target.ip_rules.iter().map(|ip| format!("geoip-{ip}")))
        .collect()
}

fn rule_set_definitions(targets: &[&RuleTarget]) -> Vec<Value> {
    let mut seen = std::collections::HashSet::new();
    let mut definitions = Vec::new();

    for target in targets {
        let sites = target
            .site_rules
            .iter()
            .map(|site| (format!("geosite-{site}"), rule_set_url(SITE_RULE_SET_URL, site)));
        let ips = target
            .ip_rules
            .iter()
            .map(|ip| (format!("geoip-{ip}"), rule_set_url(IP_RULE_SET_URL, ip)));

        for (tag, url) in sites.chain(ips) {
            if seen.insert(tag.clone()) {
                definitions.push(json!({
                    "tag": tag,
                    "type": "remote",
                    "format": "binary",
                    "url": url,
                    "download_detour": "DIRECT",
                }));
            }
        }
    }

    definitions
}

fn custom_route_rule(rule: &CustomRule) -> Option<Value> {
    let mut matcher = Map::new();
    for (key, values) in [
        ("domain_suffix", rule.domain_suffixes()),
        ("domain_keyword", rule.domain_keywords()),
        ("ip_cidr", rule.ip_cidrs()),
    ] {
        if !values.is_empty() {
            matcher.insert(key.to_string(), json!(values));
        }
    }
    if matcher.is_empty() {
        return None;
    }
    matcher.insert("outbound".to_string(), json!(rule.name));
    Some(Value::Object(matcher))
}

fn take_array(map: &mut Map<String, Value>, key: &str) -> Vec<Value> {
    match map.remove(key) {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    }
}

#[async_trait]
impl ConfigBuilder for SingboxBuilder {
    async fn build(&self, request: BuildRequest) -> Result<BuiltConfig, BuildError> {
        ensure_format(TargetFormat::Singbox, &request.options)?;

        let nodes = parse_descriptors(&request.subscription);
        let targets = selected_targets(&request.rules);
        let customs = custom_rules(&request.custom_rules);
        let mut config = base_object(request.base_config, default_base)?;

        let mut outbounds = vec![selector(NODE_SELECT, node_select_members(&nodes))];
        outbounds.extend(
            targets
                .iter()
                .map(|t| selector(t.name, rule_group_members(t.default_outbound(), &nodes))),
        );
        outbounds.extend(
            customs
                .iter()
                .map(|c| selector(&c.name, rule_group_members(NODE_SELECT, &nodes))),
        );
        outbounds.push(selector(FALL_BACK, rule_group_members(NODE_SELECT, &nodes)));
        outbounds.extend(nodes.iter().map(outbound));

        // Keep base outbounds whose tags were not generated
        let generated: std::collections::HashSet<String> = outbounds
            .iter()
            .filter_map(|o| o["tag"].as_str().map(str::to_string))
            .collect();
        outbounds.extend(take_array(&mut config, "outbounds").into_iter().filter(|o| {
            o["tag"]
                .as_str()
                .is_none_or(|tag| !generated.contains(tag))
        }));
        config.insert("outbounds".to_string(), Value::Array(outbounds));

        let mut route = match config.remove("route") {
            Some(Value::Object(route)) => route,
            _ => Map::new(),
        };

        let mut rules = take_array(&mut route, "rules");
        rules.extend(customs.iter().filter_map(custom_route_rule));
        rules.extend(
            targets
                .iter()
                .map(|t| json!({"rule_set": rule_set_tags(t), "outbound": t.name})),
        );

        let mut rule_sets = take_array(&mut route, "rule_set");
        rule_sets.extend(rule_set_definitions(&targets));

        route.insert("rule_set".to_string(), Value::Array(rule_sets));
        route.insert("rules".to_string(), Value::Array(rules));
        route.insert("final".to_string(), json!(FALL_BACK));
        config.insert("route".to_string(), Value::Object(route));

        tracing::debug!(
            "Built sing-box config with {} nodes and {} rule groups",
            nodes.len(),
            targets.len() + customs.len()
        );
        Ok(BuiltConfig::Json(Value::Object(config)))
    }
}
