//! Xray relay configuration document
//!
//! Only the subset of the Xray schema the relay generator writes is modelled.
//! The same types are used to re-read the written file, so a document that
//! deserializes back into [`XrayConfig`] is structurally complete.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

pub const INBOUND_PROTOCOL_SOCKS: &str = "socks";
pub const OUTBOUND_PROTOCOL_SHADOWSOCKS: &str = "shadowsocks";
pub const OUTBOUND_PROTOCOL_FREEDOM: &str = "freedom";
pub const DIRECT_TAG: &str = "direct";
pub const LISTEN_ALL: &str = "0.0.0.0";

/// Log levels accepted by Xray's `log.loglevel`
pub const LOG_LEVELS: [&str; 5] = ["debug", "info", "warning", "error", "none"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct XrayConfig {
    pub log: LogSection,
    pub inbounds: Vec<Inbound>,
    pub outbounds: Vec<Outbound>,
    pub routing: Routing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogSection {
    pub loglevel: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inbound {
    pub port: u16,
    pub listen: String,
    pub protocol: String,
    pub tag: String,
    pub settings: SocksSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocksSettings {
    pub auth: String,
    pub udp: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outbound {
    pub tag: String,
    pub protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<ShadowsocksSettings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_settings: Option<StreamSettings>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowsocksSettings {
    pub servers: Vec<ShadowsocksServer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShadowsocksServer {
    pub address: String,
    pub port: u16,
    pub method: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSettings {
    pub network: String,
    pub tcp_settings: TcpSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TcpSettings {
    pub header: HttpHeaderObfs,
}

/// Xray's `http` TCP header type: every connection starts with a forged request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpHeaderObfs {
    #[serde(rename = "type")]
    pub header_type: String,
    pub request: HttpRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpRequest {
    pub version: String,
    pub method: String,
    pub path: Vec<String>,
    pub headers: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Routing {
    pub domain_strategy: String,
    pub rules: Vec<RoutingRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingRule {
    #[serde(rename = "type")]
    pub rule_type: String,
    pub inbound_tag: Vec<String>,
    pub outbound_tag: String,
}

impl XrayConfig {
    /// Creates a document with no relays and no outbounds yet.
    pub fn new(log_level: &str) -> Self {
        XrayConfig {
            log: LogSection {
                loglevel: log_level.to_string(),
            },
            inbounds: Vec::new(),
            outbounds: Vec::new(),
            routing: Routing {
                domain_strategy: "AsIs".to_string(),
                rules: Vec::new(),
            },
        }
    }

    /// Number of relay triples (inbound, outbound, rule) in the document.
    pub fn relay_count(&self) -> usize {
        self.inbounds.len()
    }

    /// Checks the structural invariants of a relay document.
    ///
    /// * `rules`, `inbounds` and all outbounds but the trailing `direct` one line up 1:1
    /// * inbound ports strictly increase, so they are also unique
    /// * inbound tags and outbound tags are unique
    /// * every rule points from an existing inbound tag to an existing outbound tag
    pub fn validate(&self) -> Result<(), String> {
        let relays = self.inbounds.len();
        if self.routing.rules.len() != relays {
            return Err(format!(
                "{} routing rules for {} inbounds",
                self.routing.rules.len(),
                relays
            ));
        }
        if self.outbounds.len() != relays + 1 {
            return Err(format!(
                "{} outbounds for {} inbounds, expected one extra direct outbound",
                self.outbounds.len(),
                relays
            ));
        }
        match self.outbounds.last() {
            Some(last) if last.protocol == OUTBOUND_PROTOCOL_FREEDOM && last.tag == DIRECT_TAG => {}
            _ => return Err("last outbound is not the direct passthrough".to_string()),
        }
        if !LOG_LEVELS.contains(&self.log.loglevel.as_str()) {
            return Err(format!("unknown log level `{}`", self.log.loglevel));
        }

        let mut previous_port: Option<u16> = None;
        let mut inbound_tags = HashSet::new();
        for inbound in &self.inbounds {
            if let Some(previous) = previous_port {
                if inbound.port <= previous {
                    return Err(format!(
                        "inbound port {} does not follow {}",
                        inbound.port, previous
                    ));
                }
            }
            previous_port = Some(inbound.port);
            if !inbound_tags.insert(inbound.tag.as_str()) {
                return Err(format!("duplicate inbound tag `{}`", inbound.tag));
            }
        }

        let mut outbound_tags = HashSet::new();
        for outbound in &self.outbounds {
            if !outbound_tags.insert(outbound.tag.as_str()) {
                return Err(format!("duplicate outbound tag `{}`", outbound.tag));
            }
        }

        for (rule, inbound) in self.routing.rules.iter().zip(&self.inbounds) {
            if rule.inbound_tag != [inbound.tag.clone()] {
                return Err(format!(
                    "rule for `{}` does not match inbound `{}`",
                    rule.inbound_tag.join(","),
                    inbound.tag
                ));
            }
            if rule.outbound_tag == DIRECT_TAG || !outbound_tags.contains(rule.outbound_tag.as_str())
            {
                return Err(format!(
                    "rule for `{}` targets unknown outbound `{}`",
                    inbound.tag, rule.outbound_tag
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direct() -> Outbound {
        Outbound {
            tag: DIRECT_TAG.to_string(),
            protocol: OUTBOUND_PROTOCOL_FREEDOM.to_string(),
            settings: None,
            stream_settings: None,
        }
    }

    fn relay(config: &mut XrayConfig, port: u16, outbound_tag: &str) {
        let tag = format!("socks-{}", port);
        config.inbounds.push(Inbound {
            port,
            listen: LISTEN_ALL.to_string(),
            protocol: INBOUND_PROTOCOL_SOCKS.to_string(),
            tag: tag.clone(),
            settings: SocksSettings {
                auth: "noauth".to_string(),
                udp: true,
            },
        });
        config.outbounds.push(Outbound {
            tag: outbound_tag.to_string(),
            protocol: OUTBOUND_PROTOCOL_SHADOWSOCKS.to_string(),
            settings: None,
            stream_settings: None,
        });
        config.routing.rules.push(RoutingRule {
            rule_type: "field".to_string(),
            inbound_tag: vec![tag],
            outbound_tag: outbound_tag.to_string(),
        });
    }

    #[test]
    fn test_empty_document_with_direct_is_valid() {
        let mut config = XrayConfig::new("warning");
        config.outbounds.push(direct());
        assert!(config.validate().is_ok());
        assert_eq!(config.relay_count(), 0);
    }

    #[test]
    fn test_missing_direct_is_rejected() {
        let mut config = XrayConfig::new("warning");
        relay(&mut config, 10000, "ss-0");
        config.outbounds.push(config.outbounds[0].clone());
        config.outbounds[1].tag = "ss-1".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_outbound_tag_is_rejected() {
        let mut config = XrayConfig::new("warning");
        relay(&mut config, 10000, "ss-0");
        relay(&mut config, 10001, "ss-0");
        config.outbounds.push(direct());
        let err = config.validate().unwrap_err();
        assert!(err.contains("duplicate outbound tag"));
    }

    #[test]
    fn test_non_increasing_ports_are_rejected() {
        let mut config = XrayConfig::new("warning");
        relay(&mut config, 10001, "ss-0");
        relay(&mut config, 10001, "ss-1");
        config.outbounds.push(direct());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_log_level_is_rejected() {
        let mut config = XrayConfig::new("loud");
        config.outbounds.push(direct());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serialized_field_names() {
        let mut config = XrayConfig::new("warning");
        relay(&mut config, 10000, "ss-0");
        config.outbounds.push(direct());
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["routing"]["domainStrategy"], "AsIs");
        assert_eq!(value["routing"]["rules"][0]["type"], "field");
        assert_eq!(value["routing"]["rules"][0]["inboundTag"][0], "socks-10000");
        assert_eq!(value["routing"]["rules"][0]["outboundTag"], "ss-0");
        assert_eq!(value["outbounds"][1], serde_json::json!({"tag": "direct", "protocol": "freedom"}));
    }
}
