use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;
use url::{Host, Url};

use crate::models::SsNode;
use crate::parser::types::{MalformedUri, ParsePolicy};
use crate::utils::base64::base64_decode_padded;
use crate::utils::url::{url_decode, url_decode_plus};

const SIMPLE_OBFS: &str = "simple-obfs";
const OBFS_SERVER: &str = "obfs-server";
const DEFAULT_OBFS_MODE: &str = "http";

lazy_static! {
    static ref SS_LINK: Regex = Regex::new(
        r"^ss://(?P<credentials>[^@]*)@(?P<authority>[^?#]*)(?:\?(?P<query>[^#]*))?(?:#(?P<name>.*))?$"
    )
    .unwrap();
}

/// Parse a SIP002 Shadowsocks link into an [`SsNode`]
///
/// Accepted form: `ss://base64(method:password)@host:port[/][?plugin=...][#name]`.
/// Every failure is returned as a [`MalformedUri`]; nothing in here panics on
/// bad input, so callers can skip the line and carry on.
///
/// Only the `simple-obfs` plugin is kept. It is translated into the
/// `obfs-server;obfs=<mode>;obfs-host=<host>` descriptor the relay writes
/// into the outbound; any other plugin is dropped and the node kept.
pub fn explode_ss(line: &str, policy: &ParsePolicy) -> Result<SsNode, MalformedUri> {
    let link = line.trim();
    let caps = SS_LINK.captures(link).ok_or(MalformedUri::Structure)?;

    let (method, password) = decode_credentials(&caps["credentials"])?;
    let (server, port) = parse_authority(&caps["authority"])?;

    let (plugin, obfs_host) = match caps.name("query") {
        Some(query) => parse_plugin_query(query.as_str(), policy),
        None => (String::new(), String::new()),
    };

    let name = caps
        .name("name")
        .map(|raw| decode_name(raw.as_str(), policy.name_plus_as_space))
        .unwrap_or_default();

    debug!(
        "Parsed node `{}`: {} {}:{} plugin=`{}` obfs-host=`{}`",
        name, method, server, port, plugin, obfs_host
    );

    SsNode::new(&name, &server, port, &method, &password, &plugin, &obfs_host)
        .ok_or(MalformedUri::Credentials("empty method or password"))
}

/// Decodes `base64(method:password)`, splitting on the first colon only.
fn decode_credentials(encoded: &str) -> Result<(String, String), MalformedUri> {
    let decoded =
        base64_decode_padded(encoded).ok_or(MalformedUri::Credentials("not valid base64"))?;
    let (method, password) = decoded
        .split_once(':')
        .ok_or(MalformedUri::Credentials("no `:` between method and password"))?;
    if method.is_empty() || password.is_empty() {
        return Err(MalformedUri::Credentials("empty method or password"));
    }
    Ok((method.to_string(), password.to_string()))
}

fn parse_authority(authority: &str) -> Result<(String, u16), MalformedUri> {
    let invalid = |reason: &'static str| MalformedUri::Authority(authority.to_string(), reason);

    // SIP002 links often carry a `/` before the query
    let trimmed = authority.strip_suffix('/').unwrap_or(authority);
    let url = Url::parse(&format!("ss://{}", trimmed)).map_err(|_| invalid("not a host:port pair"))?;
    if !url.username().is_empty() || url.password().is_some() || !url.path().is_empty() {
        return Err(invalid("not a host:port pair"));
    }

    let host = match url.host() {
        Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_string(),
        Some(Host::Ipv4(addr)) => addr.to_string(),
        Some(Host::Ipv6(addr)) => addr.to_string(),
        _ => return Err(invalid("missing host")),
    };
    match url.port() {
        Some(0) => Err(invalid("port out of range")),
        Some(port) => Ok((host, port)),
        None => Err(invalid("missing port")),
    }
}

/// Returns the translated plugin descriptor and obfs host, both empty when
/// the query has no usable `plugin` parameter.
fn parse_plugin_query(query: &str, policy: &ParsePolicy) -> (String, String) {
    let plugin = url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "plugin")
        .map(|(_, value)| value.into_owned());
    let Some(plugin) = plugin else {
        return (String::new(), String::new());
    };

    match simple_obfs_options(&plugin) {
        Some(options) => translate_simple_obfs(&options, policy),
        None => {
            warn!("Unsupported plugin `{}`, node kept without it", plugin);
            (String::new(), String::new())
        }
    }
}

/// Returns the `;`-separated options of a simple-obfs plugin value.
///
/// Some converters base64-encode the whole plugin value, so a value that does
/// not start with `simple-obfs` is given a second chance as base64.
fn simple_obfs_options(plugin: &str) -> Option<String> {
    let plugin = if plugin.starts_with(SIMPLE_OBFS) {
        plugin.to_string()
    } else {
        // form decoding turns `+` into a space
        base64_decode_padded(&plugin.replace(' ', "+")).filter(|decoded| decoded.starts_with(SIMPLE_OBFS))?
    };
    Some(
        plugin
            .split_once(';')
            .map(|(_, options)| options.to_string())
            .unwrap_or_default(),
    )
}

fn translate_simple_obfs(options: &str, policy: &ParsePolicy) -> (String, String) {
    let mut obfs = None;
    let mut obfs_host = None;
    for param in options.split(';') {
        let Some((key, value)) = param.trim().split_once('=') else {
            continue;
        };
        let value = url_decode(value.trim().trim_matches('"'));
        if value.is_empty() {
            continue;
        }
        match key.trim() {
            "obfs" => obfs = Some(value),
            "obfs-host" => obfs_host = Some(value),
            _ => {}
        }
    }

    if policy.fill_plugin_defaults {
        let obfs = obfs.unwrap_or_else(|| DEFAULT_OBFS_MODE.to_string());
        let obfs_host = obfs_host.unwrap_or_else(|| policy.default_obfs_host.clone());
        let descriptor = format!("{};obfs={};obfs-host={}", OBFS_SERVER, obfs, obfs_host);
        (descriptor, obfs_host)
    } else {
        let mut descriptor = OBFS_SERVER.to_string();
        if let Some(obfs) = &obfs {
            descriptor.push_str(&format!(";obfs={}", obfs));
        }
        if let Some(obfs_host) = &obfs_host {
            descriptor.push_str(&format!(";obfs-host={}", obfs_host));
        }
        (descriptor, obfs_host.unwrap_or_default())
    }
}

fn decode_name(raw: &str, plus_as_space: bool) -> String {
    let decoded = if plus_as_space {
        url_decode_plus(raw)
    } else {
        url_decode(raw)
    };
    decoded.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CREDENTIALS: &str = "YWVzLTI1Ni1nY206cGFzc3dvcmQ=";

    fn policy_with_host(host: &str) -> ParsePolicy {
        ParsePolicy {
            default_obfs_host: host.to_string(),
            ..ParsePolicy::default()
        }
    }

    #[test]
    fn test_explode_ss_sip002_format() {
        let link = format!("ss://{}@example.com:8388", CREDENTIALS);
        let node = explode_ss(&link, &ParsePolicy::default()).unwrap();

        assert_eq!(node.server(), "example.com");
        assert_eq!(node.port(), 8388);
        assert_eq!(node.method(), "aes-256-gcm");
        assert_eq!(node.password(), "password");
        assert_eq!(node.plugin(), None);
        assert_eq!(node.obfs_host(), None);
        assert_eq!(node.name(), "");
    }

    #[test]
    fn test_explode_ss_base64_plugin_value() {
        let link = "ss://YWVzLTI1Ni1nY206cGFzc3dvcmQ=@1.2.3.4:8388?plugin=c2ltcGxlLW9iZnM7b2Jmcz1odHRwO29iZnMtaG9zdD1leGFtcGxlLmNvbQ%3D%3D#MyNode";
        let node = explode_ss(link, &ParsePolicy::default()).unwrap();

        assert_eq!(node.server(), "1.2.3.4");
        assert_eq!(node.port(), 8388);
        assert_eq!(node.method(), "aes-256-gcm");
        assert_eq!(node.password(), "password");
        assert_eq!(node.obfs_host(), Some("example.com"));
        assert_eq!(node.name(), "MyNode");
        let plugin = node.plugin().unwrap();
        assert!(plugin.contains("obfs=http"));
        assert!(plugin.contains("obfs-host=example.com"));
    }

    #[test]
    fn test_explode_ss_missing_padding() {
        let link = "ss://YWVzLTI1Ni1nY206cGFzc3dvcmQ@example.com:8388";
        let node = explode_ss(link, &ParsePolicy::default()).unwrap();
        assert_eq!(node.password(), "password");
    }

    #[test]
    fn test_explode_ss_url_safe_credentials() {
        // aes-128-gcm:k>?~~
        let link = "ss://YWVzLTEyOC1nY206az4_fn4@example.com:8388";
        let node = explode_ss(link, &ParsePolicy::default()).unwrap();
        assert_eq!(node.method(), "aes-128-gcm");
        assert_eq!(node.password(), "k>?~~");
    }

    #[test]
    fn test_explode_ss_with_password_containing_colon() {
        // chacha20-ietf-poly1305:pa:ss:word
        let link = "ss://Y2hhY2hhMjAtaWV0Zi1wb2x5MTMwNTpwYTpzczp3b3Jk@example.com:8388";
        let node = explode_ss(link, &ParsePolicy::default()).unwrap();
        assert_eq!(node.method(), "chacha20-ietf-poly1305");
        assert_eq!(node.password(), "pa:ss:word");
    }

    #[test]
    fn test_explode_ss_percent_encoded_plugin() {
        let link = format!(
            "ss://{}@example.com:8388/?plugin=simple-obfs%3Bobfs%3Dtls%3Bobfs-host%3Dexample.com#Example%20Plugin",
            CREDENTIALS
        );
        let node = explode_ss(&link, &policy_with_host("fallback.com")).unwrap();

        assert_eq!(
            node.plugin(),
            Some("obfs-server;obfs=tls;obfs-host=example.com")
        );
        assert_eq!(node.obfs_host(), Some("example.com"));
        assert_eq!(node.name(), "Example Plugin");
    }

    #[test]
    fn test_explode_ss_plugin_without_host_uses_fallback() {
        let link = format!(
            "ss://{}@example.com:8388?plugin=simple-obfs%3Bobfs%3Dtls",
            CREDENTIALS
        );
        let node = explode_ss(&link, &policy_with_host("fallback.com")).unwrap();

        assert_eq!(
            node.plugin(),
            Some("obfs-server;obfs=tls;obfs-host=fallback.com")
        );
        assert_eq!(node.obfs_host(), Some("fallback.com"));
    }

    #[test]
    fn test_explode_ss_plugin_without_options_fills_defaults() {
        let link = format!("ss://{}@example.com:8388?plugin=simple-obfs", CREDENTIALS);
        let node = explode_ss(&link, &ParsePolicy::default()).unwrap();

        assert_eq!(node.plugin(), Some("obfs-server;obfs=http;obfs-host="));
        assert_eq!(node.obfs_host(), None);
    }

    #[test]
    fn test_explode_ss_plugin_only_present_keys() {
        let policy = ParsePolicy {
            fill_plugin_defaults: false,
            default_obfs_host: "fallback.com".to_string(),
            ..ParsePolicy::default()
        };

        let link = format!(
            "ss://{}@example.com:8388?plugin=simple-obfs%3Bobfs%3Dtls",
            CREDENTIALS
        );
        let node = explode_ss(&link, &policy).unwrap();
        assert_eq!(node.plugin(), Some("obfs-server;obfs=tls"));
        assert_eq!(node.obfs_host(), None);

        let link = format!("ss://{}@example.com:8388?plugin=simple-obfs", CREDENTIALS);
        let node = explode_ss(&link, &policy).unwrap();
        assert_eq!(node.plugin(), Some("obfs-server"));
    }

    #[test]
    fn test_explode_ss_plugin_quoted_and_spaced_values() {
        let link = format!(
            "ss://{}@example.com:8388?plugin=simple-obfs%3B%20obfs%3D%22http%22%3B%20obfs-host%3D%22cdn.example.com%22",
            CREDENTIALS
        );
        let node = explode_ss(&link, &ParsePolicy::default()).unwrap();
        assert_eq!(
            node.plugin(),
            Some("obfs-server;obfs=http;obfs-host=cdn.example.com")
        );
    }

    #[test]
    fn test_explode_ss_unsupported_plugin_is_dropped() {
        let link = format!(
            "ss://{}@example.com:8388/?plugin=v2ray-plugin%3Bmode%3Dwebsocket#Node",
            CREDENTIALS
        );
        let node = explode_ss(&link, &ParsePolicy::default()).unwrap();
        assert_eq!(node.plugin(), None);
        assert_eq!(node.obfs_host(), None);
        assert_eq!(node.name(), "Node");
    }

    #[test]
    fn test_explode_ss_with_non_plugin_query() {
        let link = format!("ss://{}@example.com:8388/?group=Zm9v&udp=1", CREDENTIALS);
        let node = explode_ss(&link, &ParsePolicy::default()).unwrap();
        assert_eq!(node.plugin(), None);
    }

    #[test]
    fn test_explode_ss_name_plus_policy() {
        let link = format!("ss://{}@example.com:8388#Hong+Kong%2B01", CREDENTIALS);

        let node = explode_ss(&link, &ParsePolicy::default()).unwrap();
        assert_eq!(node.name(), "Hong+Kong+01");

        let policy = ParsePolicy {
            name_plus_as_space: true,
            ..ParsePolicy::default()
        };
        let node = explode_ss(&link, &policy).unwrap();
        assert_eq!(node.name(), "Hong Kong+01");
    }

    #[test]
    fn test_explode_ss_with_ipv6() {
        let link = format!("ss://{}@[2001:db8::1]:8388", CREDENTIALS);
        let node = explode_ss(&link, &ParsePolicy::default()).unwrap();
        assert_eq!(node.server(), "2001:db8::1");
        assert_eq!(node.port(), 8388);
    }

    #[test]
    fn test_explode_ss_trims_line_endings() {
        let link = format!("  ss://{}@example.com:8388#Node\r\n", CREDENTIALS);
        let node = explode_ss(&link, &ParsePolicy::default()).unwrap();
        assert_eq!(node.name(), "Node");
    }

    #[test]
    fn test_explode_ss_invalid_structure() {
        let policy = ParsePolicy::default();
        assert_eq!(explode_ss("ss://invalid", &policy), Err(MalformedUri::Structure));
        assert_eq!(
            explode_ss("vmess://abc@example.com:1", &policy),
            Err(MalformedUri::Structure)
        );
        assert_eq!(explode_ss("", &policy), Err(MalformedUri::Structure));
    }

    #[test]
    fn test_explode_ss_invalid_credentials() {
        let policy = ParsePolicy::default();
        for link in [
            "ss://@example.com:8388",
            "ss://not*base64@example.com:8388",
            // aes-256-gcm
            "ss://YWVzLTI1Ni1nY20=@example.com:8388",
            // aes-256-gcm:
            "ss://YWVzLTI1Ni1nY206@example.com:8388",
            // invalid UTF-8
            "ss://__4@example.com:8388",
        ] {
            assert!(
                matches!(explode_ss(link, &policy), Err(MalformedUri::Credentials(_))),
                "{}",
                link
            );
        }
    }

    #[test]
    fn test_explode_ss_invalid_authority() {
        let policy = ParsePolicy::default();
        for authority in [
            "example.com",
            "example.com:",
            "example.com:port",
            "example.com:0",
            "example.com:65536",
            "example.com:-1",
            ":8388",
            "example.com:8388/path",
            "user@example.com:8388",
        ] {
            let link = format!("ss://{}@{}", CREDENTIALS, authority);
            assert!(
                matches!(explode_ss(&link, &policy), Err(MalformedUri::Authority(..))),
                "{}",
                link
            );
        }
    }

    #[test]
    fn test_explode_ss_port_bounds() {
        let policy = ParsePolicy::default();
        let low = format!("ss://{}@example.com:1", CREDENTIALS);
        let high = format!("ss://{}@example.com:65535", CREDENTIALS);
        assert_eq!(explode_ss(&low, &policy).unwrap().port(), 1);
        assert_eq!(explode_ss(&high, &policy).unwrap().port(), 65535);
    }
}
