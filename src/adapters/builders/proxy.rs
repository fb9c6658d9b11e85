//! Proxy descriptor parsing shared by the reference builders.
use std::collections::HashMap;

use serde::Deserialize;
use url::Url;

use crate::core::codec::{decode_base64, percent_decode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Shadowsocks,
    Vmess,
    Vless,
    Trojan,
    Hysteria2,
    Tuic,
}

/// One parsed proxy endpoint
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProxyNode {
    pub name: String,
    pub protocol: Option<Protocol>,
    pub server: String,
    pub port: u16,
    pub uuid: Option<String>,
    pub password: Option<String>,
    /// Shadowsocks method
    pub cipher: Option<String>,
    pub alter_id: u32,
    pub tls: bool,
    pub sni: Option<String>,
    pub insecure: bool,
    /// Transport: `ws`, `grpc`, `http` ...
    pub network: Option<String>,
    pub path: Option<String>,
    pub host: Option<String>,
    pub flow: Option<String>,
}

impl ProxyNode {
    pub fn protocol(&self) -> Protocol {
        self.protocol.unwrap_or(Protocol::Shadowsocks)
    }
}

/// Parse every descriptor, skipping the ones that are not proxy URIs, and make
/// the node names unique.
pub fn parse_descriptors(descriptors: &[String]) -> Vec<ProxyNode> {
    let mut nodes: Vec<ProxyNode> = descriptors
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let node = parse_descriptor(line);
            if node.is_none() {
                tracing::debug!("Skipping unparseable descriptor: {}", line);
            }
            node
        })
        .collect();

    dedupe_names(&mut nodes);
    nodes
}

pub fn parse_descriptor(line: &str) -> Option<ProxyNode> {
    let (scheme, _) = line.split_once("://")?;
    match scheme.to_ascii_lowercase().as_str() {
        "ss" => parse_shadowsocks(line),
        "vmess" => parse_vmess(line),
        "vless" => parse_uri(line, Protocol::Vless),
        "trojan" => parse_uri(line, Protocol::Trojan),
        "hysteria2" | "hy2" => parse_uri(line, Protocol::Hysteria2),
        "tuic" => parse_uri(line, Protocol::Tuic),
        _ => None,
    }
}

/// Append ` 2`, ` 3` ... to repeated names
fn dedupe_names(nodes: &mut [ProxyNode]) {
    let mut seen: HashMap<String, usize> = HashMap::new();
    for node in nodes.iter_mut() {
        let count = seen.entry(node.name.clone()).or_insert(0);
        *count += 1;
        if *count > 1 {
            node.name = format!("{} {}", node.name, count);
        }
    }
}

fn fragment_name(url: &Url) -> Option<String> {
    let fragment = url.fragment()?;
    let name = percent_decode(fragment).unwrap_or_else(|_| fragment.to_string());
    (!name.trim().is_empty()).then(|| name.trim().to_string())
}

fn default_name(server: &str, port: u16) -> String {
    format!("{server}:{port}")
}

fn parse_uri(line: &str, protocol: Protocol) -> Option<ProxyNode> {
    let url = Url::parse(line).ok()?;
    let server = url.host_str()?.trim_matches(['[', ']']).to_string();
    let port = url.port()?;
    let query: HashMap<String, String> = url.query_pairs().into_owned().collect();

    let user = percent_decode(url.username()).ok()?;
    let password = url.password().and_then(|p| percent_decode(p).ok());

    let (uuid, password) = match protocol {
        Protocol::Vless => (Some(user), None),
        Protocol::Tuic => (Some(user), password),
        _ => (None, Some(user)),
    };
    if uuid.as_deref().or(password.as_deref()).is_none_or(str::is_empty) {
        return None;
    }

    let security = query.get("security").map(String::as_str);
    let tls = match protocol {
        Protocol::Trojan | Protocol::Hysteria2 | Protocol::Tuic => true,
        _ => matches!(security, Some("tls") | Some("reality")),
    };

    Some(ProxyNode {
        name: fragment_name(&url).unwrap_or_else(|| default_name(&server, port)),
        protocol: Some(protocol),
        uuid,
        password,
        tls,
        sni: query.get("sni").or_else(|| query.get("peer")).cloned(),
        insecure: matches!(
            query.get("insecure").or_else(|| query.get("allowInsecure")).map(String::as_str),
            Some("1") | Some("true")
        ),
        network: query.get("type").filter(|t| *t != "tcp").cloned(),
        path: query.get("path").or_else(|| query.get("serviceName")).cloned(),
        host: query.get("host").cloned(),
        flow: query.get("flow").filter(|f| !f.is_empty()).cloned(),
        server,
        port,
        ..Default::default()
    })
}

/// `ss://base64(method:password)@host:port#name`, or the legacy
/// `ss://base64(method:password@host:port)#name`
fn parse_shadowsocks(line: &str) -> Option<ProxyNode> {
    let body = &line["ss://".len()..];
    let (body, fragment) = match body.split_once('#') {
        Some((body, fragment)) => (body, Some(fragment)),
        None => (body, None),
    };
    let body = body.split_once('?').map_or(body, |(b, _)| b);

    let plain = match body.rsplit_once('@') {
        Some((userinfo, host)) => {
            let userinfo = decode_base64(userinfo)
                .or_else(|_| percent_decode(userinfo))
                .ok()?;
            format!("{userinfo}@{host}")
        }
        None => decode_base64(body).ok()?,
    };

    let (userinfo, address) = plain.rsplit_once('@')?;
    let (cipher, password) = userinfo.split_once(':')?;
    let (server, port) = address.trim_end_matches('/').rsplit_once(':')?;
    let server = server.trim_matches(['[', ']']).to_string();
    let port: u16 = port.parse().ok()?;

    let name = fragment
        .map(|f| percent_decode(f).unwrap_or_else(|_| f.to_string()))
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| default_name(&server, port));

    Some(ProxyNode {
        name,
        protocol: Some(Protocol::Shadowsocks),
        cipher: Some(cipher.to_string()),
        password: Some(password.to_string()),
        server,
        port,
        ..Default::default()
    })
}

#[derive(Deserialize)]
struct VmessLink {
    #[serde(default)]
    ps: String,
    add: String,
    port: StringOrNumber,
    id: String,
    #[serde(default)]
    aid: Option<StringOrNumber>,
    #[serde(default)]
    net: Option<String>,
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    tls: Option<String>,
    #[serde(default)]
    sni: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    Number(u64),
    String(String),
}

impl StringOrNumber {
    fn as_u64(&self) -> Option<u64> {
        match self {
            StringOrNumber::Number(n) => Some(*n),
            StringOrNumber::String(s) => s.trim().parse().ok(),
        }
    }
}

/// `vmess://base64(json)`
fn parse_vmess(line: &str) -> Option<ProxyNode> {
    let json = decode_base64(&line["vmess://".len()..]).ok()?;
    let link: VmessLink = serde_json::from_str(&json).ok()?;

    let port = u16::try_from(link.port.as_u64()?).ok()?;
    let non_empty = |v: Option<String>| v.filter(|s| !s.is_empty());

    Some(ProxyNode {
        name: if link.ps.trim().is_empty() {
            default_name(&link.add, port)
        } else {
            link.ps.trim().to_string()
        },
        protocol: Some(Protocol::Vmess),
        uuid: Some(link.id),
        alter_id: link
            .aid
            .and_then(|a| a.as_u64())
            .and_then(|a| u32::try_from(a).ok())
            .unwrap_or_default(),
        tls: link.tls.as_deref() == Some("tls"),
        sni: non_empty(link.sni),
        network: non_empty(link.net).filter(|n| n != "tcp"),
        path: non_empty(link.path),
        host: non_empty(link.host),
        server: link.add,
        port,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codec::encode_base64;

    #[test]
    fn test_shadowsocks_sip002() {
        let line = format!("ss://{}@1.2.3.4:8388#HK%2001", encode_base64("aes-256-gcm:secret"));
        let node = parse_descriptor(&line).unwrap();
        assert_eq!(node.protocol(), Protocol::Shadowsocks);
        assert_eq!(node.name, "HK 01");
        assert_eq!(node.server, "1.2.3.4");
        assert_eq!(node.port, 8388);
        assert_eq!(node.cipher.as_deref(), Some("aes-256-gcm"));
        assert_eq!(node.password.as_deref(), Some("secret"));
    }

    #[test]
    fn test_shadowsocks_legacy() {
        let line = format!("ss://{}", encode_base64("chacha20-ietf-poly1305:pw@example.com:443"));
        let node = parse_descriptor(&line).unwrap();
        assert_eq!(node.name, "example.com:443");
        assert_eq!(node.cipher.as_deref(), Some("chacha20-ietf-poly1305"));
    }

    #[test]
    fn test_vmess() {
        let json = r#"{"v":"2","ps":"JP","add":"jp.example.com","port":"443","id":"uuid-1","aid":0,"net":"ws","path":"/ray","host":"cdn.example.com","tls":"tls"}"#;
        let node = parse_descriptor(&format!("vmess://{}", encode_base64(json))).unwrap();
        assert_eq!(node.protocol(), Protocol::Vmess);
        assert_eq!(node.name, "JP");
        assert_eq!(node.port, 443);
        assert_eq!(node.uuid.as_deref(), Some("uuid-1"));
        assert!(node.tls);
        assert_eq!(node.network.as_deref(), Some("ws"));
        assert_eq!(node.path.as_deref(), Some("/ray"));
    }

    #[test]
    fn test_vless_and_trojan() {
        let vless = parse_descriptor(
            "vless://uuid-2@v.example.com:8443?security=tls&sni=v.example.com&type=grpc&serviceName=svc#VL",
        )
        .unwrap();
        assert_eq!(vless.uuid.as_deref(), Some("uuid-2"));
        assert!(vless.tls);
        assert_eq!(vless.network.as_deref(), Some("grpc"));
        assert_eq!(vless.path.as_deref(), Some("svc"));

        let trojan = parse_descriptor("trojan://pass@t.example.com:443?allowInsecure=1#TR").unwrap();
        assert_eq!(trojan.password.as_deref(), Some("pass"));
        assert!(trojan.tls);
        assert!(trojan.insecure);
    }

    #[test]
    fn test_tuic_and_hysteria2() {
        let tuic = parse_descriptor("tuic://uuid-3:pw@q.example.com:443?sni=q#TU").unwrap();
        assert_eq!(tuic.uuid.as_deref(), Some("uuid-3"));
        assert_eq!(tuic.password.as_deref(), Some("pw"));

        let hy = parse_descriptor("hy2://auth@h.example.com:8443#HY").unwrap();
        assert_eq!(hy.protocol(), Protocol::Hysteria2);
        assert_eq!(hy.password.as_deref(), Some("auth"));
    }

    #[test]
    fn test_unparseable_descriptors_are_skipped() {
        let nodes = parse_descriptors(&[
            "".to_string(),
            "not a proxy".to_string(),
            "http://example.com/sub".to_string(),
            "vmess://!!!".to_string(),
            "trojan://pw@a.example.com:443#A".to_string(),
        ]);
        assert_eq!(nodes.len(), 1);
    }

    #[test]
    fn test_duplicate_names_are_suffixed() {
        let nodes = parse_descriptors(&[
            "trojan://pw@a.example.com:443#Same".to_string(),
            "trojan://pw@b.example.com:443#Same".to_string(),
        ]);
        assert_eq!(nodes[0].name, "Same");
        assert_eq!(nodes[1].name, "Same 2");
    }
}
