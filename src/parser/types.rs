use thiserror::Error;

/// Why a subscription line could not be turned into a node.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedUri {
    #[error("not of the form ss://<credentials>@<host>:<port>[?query][#name]")]
    Structure,
    #[error("credentials: {0}")]
    Credentials(&'static str),
    #[error("server address `{0}`: {1}")]
    Authority(String, &'static str),
}

/// Decoding choices on which the historical generators disagreed.
///
/// Each flag is independent so that both behaviours stay reachable until one
/// of them is confirmed as the intended one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsePolicy {
    /// Decode a literal `+` in the node name as a space.
    pub name_plus_as_space: bool,
    /// Always emit `obfs` and `obfs-host` in the translated simple-obfs
    /// descriptor, filling `obfs=http` and the fallback host when absent.
    /// When off, only the keys present in the link are emitted.
    pub fill_plugin_defaults: bool,
    /// Fallback for a missing `obfs-host`, possibly empty.
    pub default_obfs_host: String,
}

impl Default for ParsePolicy {
    fn default() -> Self {
        ParsePolicy {
            name_plus_as_space: false,
            fill_plugin_defaults: true,
            default_obfs_host: String::new(),
        }
    }
}
