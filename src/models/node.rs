//! Shadowsocks node model
//!
//! An [`SsNode`] is only ever built by the link parser, which guarantees a
//! non-zero port and non-empty credentials. The fields are private so that
//! these guarantees survive until the node is folded into a relay config.

/// One Shadowsocks endpoint taken from a subscription feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SsNode {
    name: String,
    server: String,
    port: u16,
    method: String,
    password: String,
    /// Translated plugin descriptor, e.g. `obfs-server;obfs=http;obfs-host=a.com`
    plugin: String,
    obfs_host: String,
}

impl SsNode {
    /// Creates a node from already validated parts.
    ///
    /// Returns `None` when `port` is zero or `method`/`password` is empty.
    pub fn new(
        name: &str,
        server: &str,
        port: u16,
        method: &str,
        password: &str,
        plugin: &str,
        obfs_host: &str,
    ) -> Option<Self> {
        if port == 0 || server.is_empty() || method.is_empty() || password.is_empty() {
            return None;
        }
        Some(SsNode {
            name: name.to_string(),
            server: server.to_string(),
            port,
            method: method.to_string(),
            password: password.to_string(),
            plugin: plugin.to_string(),
            obfs_host: obfs_host.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// The translated plugin descriptor, or `None` when the node has no plugin.
    pub fn plugin(&self) -> Option<&str> {
        if self.plugin.is_empty() {
            None
        } else {
            Some(&self.plugin)
        }
    }

    /// The obfuscation host, or `None` when the link did not provide one.
    pub fn obfs_host(&self) -> Option<&str> {
        if self.obfs_host.is_empty() {
            None
        } else {
            Some(&self.obfs_host)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_broken_invariants() {
        assert!(SsNode::new("", "1.2.3.4", 0, "aes-256-gcm", "pw", "", "").is_none());
        assert!(SsNode::new("", "1.2.3.4", 8388, "", "pw", "", "").is_none());
        assert!(SsNode::new("", "1.2.3.4", 8388, "aes-256-gcm", "", "", "").is_none());
        assert!(SsNode::new("", "", 8388, "aes-256-gcm", "pw", "", "").is_none());
    }

    #[test]
    fn test_empty_optionals_read_as_none() {
        let node = SsNode::new("", "1.2.3.4", 8388, "aes-256-gcm", "pw", "", "").unwrap();
        assert_eq!(node.plugin(), None);
        assert_eq!(node.obfs_host(), None);
        assert_eq!(node.name(), "");
    }
}
