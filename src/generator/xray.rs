use std::collections::BTreeMap;

use log::{info, warn};
use thiserror::Error;

use crate::generator::port_probe::{NoProbe, PortProbe, TcpBindProbe};
use crate::models::xray::{
    HttpHeaderObfs, HttpRequest, Inbound, Outbound, RoutingRule, ShadowsocksServer,
    ShadowsocksSettings, SocksSettings, StreamSettings, TcpSettings, DIRECT_TAG,
    INBOUND_PROTOCOL_SOCKS, LISTEN_ALL, OUTBOUND_PROTOCOL_FREEDOM, OUTBOUND_PROTOCOL_SHADOWSOCKS,
};
use crate::models::{SsNode, XrayConfig};
use crate::utils::file::PersistError;

/// Host header used when neither the node nor the settings provide one
pub const PLACEHOLDER_OBFS_HOST: &str = "0a11ab2f647b.microsoft.com";

const DISGUISE_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Settings for building a relay document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOptions {
    /// Local port of the first relay
    pub port_start: u16,
    /// Maximum number of input nodes considered
    pub max_ports: usize,
    /// Host header fallback for nodes without an obfs host
    pub default_obfs_host: String,
    /// Whether to check that a local port can be bound before using it
    pub probe_ports: bool,
    /// Value of the engine's `log.loglevel`
    pub log_level: String,
}

impl Default for RelayOptions {
    fn default() -> Self {
        RelayOptions {
            port_start: 10000,
            max_ports: 300,
            default_obfs_host: String::new(),
            probe_ports: true,
            log_level: "warning".to_string(),
        }
    }
}

/// Why a node got no relay.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortUnavailable {
    #[error("local port {0} is beyond 65535")]
    OutOfRange(u32),
    #[error("local port {0} is already in use")]
    InUse(u16),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedNode {
    /// Position of the node in the input list
    pub index: usize,
    pub name: String,
    pub reason: PortUnavailable,
}

/// A validated relay document and the nodes that did not make it in.
#[derive(Debug, Clone, PartialEq)]
pub struct Synthesis {
    pub config: XrayConfig,
    pub skipped: Vec<SkippedNode>,
}

/// Build the relay document, probing ports only if `options.probe_ports` is set.
pub fn proxy_to_xray(nodes: &[SsNode], options: &RelayOptions) -> Result<Synthesis, PersistError> {
    if options.probe_ports {
        proxy_to_xray_with_probe(nodes, options, &TcpBindProbe)
    } else {
        proxy_to_xray_with_probe(nodes, options, &NoProbe)
    }
}

/// Build the relay document using `probe` to decide whether a port is usable.
///
/// Only the first `max_ports` nodes are considered. Node `i` gets local port
/// `port_start + i`; a node whose port is unavailable is skipped and its port
/// left unused, so later nodes keep their positional port.
pub fn proxy_to_xray_with_probe<P: PortProbe + ?Sized>(
    nodes: &[SsNode],
    options: &RelayOptions,
    probe: &P,
) -> Result<Synthesis, PersistError> {
    let mut config = XrayConfig::new(&options.log_level);
    let mut skipped = Vec::new();

    for (index, node) in nodes.iter().take(options.max_ports).enumerate() {
        let candidate = u32::from(options.port_start) + index as u32;
        let port = match u16::try_from(candidate) {
            Ok(port) if probe.is_free(port) => port,
            Ok(port) => {
                warn!("Port {} is in use, skipping node `{}`", port, node.name());
                skipped.push(SkippedNode {
                    index,
                    name: node.name().to_string(),
                    reason: PortUnavailable::InUse(port),
                });
                continue;
            }
            Err(_) => {
                warn!("Port {} is out of range, skipping node `{}`", candidate, node.name());
                skipped.push(SkippedNode {
                    index,
                    name: node.name().to_string(),
                    reason: PortUnavailable::OutOfRange(candidate),
                });
                continue;
            }
        };

        let inbound_tag = format!("socks-{}", port);
        let outbound_tag = format!("ss-{}", index);

        config.inbounds.push(socks_inbound(port, &inbound_tag));
        config
            .outbounds
            .push(shadowsocks_outbound(node, &outbound_tag, &options.default_obfs_host));
        config.routing.rules.push(RoutingRule {
            rule_type: "field".to_string(),
            inbound_tag: vec![inbound_tag],
            outbound_tag,
        });
    }

    config.outbounds.push(Outbound {
        tag: DIRECT_TAG.to_string(),
        protocol: OUTBOUND_PROTOCOL_FREEDOM.to_string(),
        settings: None,
        stream_settings: None,
    });

    config.validate().map_err(PersistError::Schema)?;

    info!(
        "Generated {} relays, skipped {} nodes",
        config.relay_count(),
        skipped.len()
    );
    Ok(Synthesis { config, skipped })
}

fn socks_inbound(port: u16, tag: &str) -> Inbound {
    Inbound {
        port,
        listen: LISTEN_ALL.to_string(),
        protocol: INBOUND_PROTOCOL_SOCKS.to_string(),
        tag: tag.to_string(),
        settings: SocksSettings {
            auth: "noauth".to_string(),
            udp: true,
        },
    }
}

fn shadowsocks_outbound(node: &SsNode, tag: &str, default_obfs_host: &str) -> Outbound {
    Outbound {
        tag: tag.to_string(),
        protocol: OUTBOUND_PROTOCOL_SHADOWSOCKS.to_string(),
        settings: Some(ShadowsocksSettings {
            servers: vec![ShadowsocksServer {
                address: node.server().to_string(),
                port: node.port(),
                method: node.method().to_string(),
                password: node.password().to_string(),
                plugin: node.plugin().map(str::to_string),
            }],
        }),
        stream_settings: Some(http_disguise(disguise_host(node, default_obfs_host))),
    }
}

/// Host header for the forged request: node, then settings, then placeholder.
fn disguise_host<'a>(node: &'a SsNode, default_obfs_host: &'a str) -> &'a str {
    node.obfs_host()
        .or_else(|| Some(default_obfs_host).filter(|host| !host.is_empty()))
        .unwrap_or(PLACEHOLDER_OBFS_HOST)
}

/// TCP header obfuscation applied to every relay outbound.
///
/// This does not depend on the node having a simple-obfs plugin: nodes
/// without one still get the forged HTTP request header.
fn http_disguise(host: &str) -> StreamSettings {
    let header = |value: &str| vec![value.to_string()];
    let headers = BTreeMap::from([
        ("Host".to_string(), header(host)),
        ("User-Agent".to_string(), header(DISGUISE_USER_AGENT)),
        ("Accept-Encoding".to_string(), header("gzip, deflate")),
        ("Connection".to_string(), header("keep-alive")),
        ("Pragma".to_string(), header("no-cache")),
    ]);

    StreamSettings {
        network: "tcp".to_string(),
        tcp_settings: TcpSettings {
            header: HttpHeaderObfs {
                header_type: "http".to_string(),
                request: HttpRequest {
                    version: "1.1".to_string(),
                    method: "GET".to_string(),
                    path: vec!["/".to_string()],
                    headers,
                },
            },
        },
    }
}
