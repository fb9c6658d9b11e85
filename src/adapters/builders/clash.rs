use async_trait::async_trait;
use serde_json::{Map, Value, json};

use super::{
    FALL_BACK, NODE_SELECT, base_object, custom_rules, ensure_format, node_select_members,
    proxy::{Protocol, ProxyNode, parse_descriptors},
    rule_group_members, selected_targets,
};
use crate::ports::config_builder::{
    BuildError, BuildRequest, BuiltConfig, ConfigBuilder, TargetFormat,
};

/// Builds Clash (mihomo) YAML configs
#[derive(Debug, Default, Clone, Copy)]
pub struct ClashBuilder;

fn default_base() -> Map<String, Value> {
    let base = json!({
        "port": 7890,
        "socks-port": 7891,
        "allow-lan": false,
        "mode": "rule",
        "log-level": "info",
        "dns": {
            "enable": true,
            "ipv6": false,
            "enhanced-mode": "fake-ip",
            "nameserver": ["https://223.5.5.5/dns-query", "https://1.12.12.12/dns-query"]
        }
    });

    match base {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

fn proxy(node: &ProxyNode) -> Value {
    let mut out = Map::new();
    let mut set = |key: &str, value: Value| {
        if !value.is_null() {
            out.insert(key.to_string(), value);
        }
    };

    set("name", json!(node.name));
    set("server", json!(node.server));
    set("port", json!(node.port));

    match node.protocol() {
        Protocol::Shadowsocks => {
            set("type", json!("ss"));
            set("cipher", json!(node.cipher));
            set("password", json!(node.password));
        }
        Protocol::Vmess => {
            set("type", json!("vmess"));
            set("uuid", json!(node.uuid));
            set("alterId", json!(node.alter_id));
            set("cipher", json!("auto"));
        }
        Protocol::Vless => {
            set("type", json!("vless"));
            set("uuid", json!(node.uuid));
            set("flow", json!(node.flow));
        }
        Protocol::Trojan => {
            set("type", json!("trojan"));
            set("password", json!(node.password));
        }
        Protocol::Hysteria2 => {
            set("type", json!("hysteria2"));
            set("password", json!(node.password));
        }
        Protocol::Tuic => {
            set("type", json!("tuic"));
            set("uuid", json!(node.uuid));
            set("password", json!(node.password));
            set("congestion-controller", json!("bbr"));
        }
    }

    if node.tls {
        match node.protocol() {
            Protocol::Vmess | Protocol::Vless => {
                set("tls", json!(true));
                set("servername", json!(node.sni));
            }
            _ => set("sni", json!(node.sni)),
        }
        if node.insecure {
            set("skip-cert-verify", json!(true));
        }
    }

    match node.network.as_deref() {
        Some("ws") => {
            set("network", json!("ws"));
            let mut opts = json!({"path": node.path.as_deref().unwrap_or("/")});
            if let Some(host) = &node.host {
                opts["headers"] = json!({"Host": host});
            }
            set("ws-opts", opts);
        }
        Some("grpc") => {
            set("network", json!("grpc"));
            set("grpc-opts", json!({"grpc-service-name": node.path}));
        }
        Some(other) => set("network", json!(other)),
        None => {}
    }

    Value::Object(out)
}

fn group(name: &str, proxies: Vec<String>) -> Value {
    json!({"name": name, "type": "select", "proxies": proxies})
}

fn take_array(map: &mut Map<String, Value>, key: &str) -> Vec<Value> {
    match map.remove(key) {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    }
}

#[async_trait]
impl ConfigBuilder for ClashBuilder {
    async fn build(&self, request: BuildRequest) -> Result<BuiltConfig, BuildError> {
        ensure_format(TargetFormat::Clash, &request.options)?;

        let nodes = parse_descriptors(&request.subscription);
        let targets = selected_targets(&request.rules);
        let customs = custom_rules(&request.custom_rules);
        let mut config = base_object(request.base_config, default_base)?;

        let mut proxies: Vec<Value> = nodes.iter().map(proxy).collect();
        proxies.extend(take_array(&mut config, "proxies"));

        let mut groups = vec![group(NODE_SELECT, node_select_members(&nodes))];
        groups.extend(
            targets
                .iter()
                .map(|t| group(t.name, rule_group_members(t.default_outbound(), &nodes))),
        );
        groups.extend(
            customs
                .iter()
                .map(|c| group(&c.name, rule_group_members(NODE_SELECT, &nodes))),
        );
        groups.push(group(FALL_BACK, rule_group_members(NODE_SELECT, &nodes)));
        groups.extend(take_array(&mut config, "proxy-groups"));

        // Base rules stay first, minus their catch-all
        let mut rules: Vec<Value> = take_array(&mut config, "rules")
            .into_iter()
            .filter(|rule| !rule.as_str().is_some_and(|r| r.starts_with("MATCH,")))
            .collect();
        for custom in &customs {
            rules.extend(
                custom
                    .domain_suffixes()
                    .into_iter()
                    .map(|d| json!(format!("DOMAIN-SUFFIX,{d},{}", custom.name))),
            );
            rules.extend(
                custom
                    .domain_keywords()
                    .into_iter()
                    .map(|k| json!(format!("DOMAIN-KEYWORD,{k},{}", custom.name))),
            );
            rules.extend(
                custom
                    .ip_cidrs()
                    .into_iter()
                    .map(|ip| json!(format!("IP-CIDR,{ip},{},no-resolve", custom.name))),
            );
        }
        for target in &targets {
            rules.extend(
                target
                    .site_rules
                    .iter()
                    .map(|site| json!(format!("GEOSITE,{site},{}", target.name))),
            );
            rules.extend(
                target
                    .ip_rules
                    .iter()
                    .map(|ip| json!(format!("GEOIP,{ip},{},no-resolve", target.name))),
            );
        }
        rules.push(json!(format!("MATCH,{FALL_BACK}")));

        config.insert("proxies".to_string(), Value::Array(proxies));
        config.insert("proxy-groups".to_string(), Value::Array(groups));
        config.insert("rules".to_string(), Value::Array(rules));

        let yaml = serde_yaml::to_string(&Value::Object(config))
            .map_err(|e| BuildError::Serialization(e.to_string()))?;

        tracing::debug!("Built Clash config with {} nodes", nodes.len());
        Ok(BuiltConfig::Yaml(yaml))
    }
}
