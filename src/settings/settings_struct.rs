use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::generator::RelayOptions;
use crate::models::xray::LOG_LEVELS;
use crate::parser::ParsePolicy;
use crate::utils::http::DEFAULT_TIMEOUT;

fn default_subconverter_api() -> String {
    "http://127.0.0.1:25500/sub".to_string()
}

fn default_port_start() -> u16 {
    10000
}

fn default_max_ports() -> usize {
    300
}

fn default_output_path() -> PathBuf {
    PathBuf::from("/usr/local/etc/xray/config.json")
}

fn default_true() -> bool {
    true
}

fn default_fetch_timeout() -> u64 {
    DEFAULT_TIMEOUT
}

fn default_xray_log_level() -> String {
    "warning".to_string()
}

/// Everything a run needs, resolved once at start-up.
///
/// Sources are layered: built-in defaults, then the optional settings file,
/// then environment variables, then command line flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Subscription converter endpoint returning `ss://` lists
    pub subconverter_api: String,
    pub subscriptions: Vec<String>,
    pub port_start: u16,
    pub max_ports: usize,
    pub output_path: PathBuf,
    pub default_obfs_host: String,
    pub probe_ports: bool,
    pub name_plus_as_space: bool,
    pub fill_plugin_defaults: bool,
    /// Per-request timeout in seconds
    pub fetch_timeout: u64,
    pub xray_log_level: String,
    /// Append log lines to this file instead of stderr
    pub log_file: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            subconverter_api: default_subconverter_api(),
            subscriptions: Vec::new(),
            port_start: default_port_start(),
            max_ports: default_max_ports(),
            output_path: default_output_path(),
            default_obfs_host: String::new(),
            probe_ports: default_true(),
            name_plus_as_space: false,
            fill_plugin_defaults: default_true(),
            fetch_timeout: default_fetch_timeout(),
            xray_log_level: default_xray_log_level(),
            log_file: None,
        }
    }
}

impl Settings {
    /// Load settings from a TOML or YAML file.
    ///
    /// The format follows the extension; anything else is tried as TOML first
    /// and YAML second.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read settings file {}", path.display()))?;
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);

        let settings = match extension.as_deref() {
            Some("toml") => toml::from_str(&content)?,
            Some("yaml") | Some("yml") => serde_yaml::from_str(&content)?,
            _ => Settings::load_from_content(&content)?,
        };
        Ok(settings)
    }

    /// Parse settings content of unknown format.
    pub fn load_from_content(content: &str) -> Result<Self> {
        match toml::from_str(content) {
            Ok(settings) => Ok(settings),
            Err(toml_err) => serde_yaml::from_str(content).with_context(|| {
                format!("settings are neither TOML ({}) nor YAML", toml_err.message())
            }),
        }
    }

    /// Override fields from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Override fields from `lookup`, which maps a variable name to its value.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(api) = lookup("SUBCONVERTER_API") {
            self.subconverter_api = api;
        }
        if let Some(list) = lookup("CLASH_SUBSCRIPTIONS") {
            self.subscriptions = split_list(&list);
        }
        if let Some(value) = lookup("PORT_START") {
            self.port_start = parse_env("PORT_START", &value)?;
        }
        if let Some(value) = lookup("MAX_PORTS") {
            self.max_ports = parse_env("MAX_PORTS", &value)?;
        }
        if let Some(path) = lookup("XRAY_CONFIG_PATH") {
            self.output_path = PathBuf::from(path);
        }
        if let Some(host) = lookup("DEFAULT_OBFS_HOST") {
            self.default_obfs_host = host;
        }
        if let Some(value) = lookup("PROBE_PORTS") {
            self.probe_ports = parse_bool("PROBE_PORTS", &value)?;
        }
        if let Some(value) = lookup("NAME_PLUS_AS_SPACE") {
            self.name_plus_as_space = parse_bool("NAME_PLUS_AS_SPACE", &value)?;
        }
        if let Some(value) = lookup("FILL_PLUGIN_DEFAULTS") {
            self.fill_plugin_defaults = parse_bool("FILL_PLUGIN_DEFAULTS", &value)?;
        }
        if let Some(value) = lookup("FETCH_TIMEOUT") {
            self.fetch_timeout = parse_env("FETCH_TIMEOUT", &value)?;
        }
        if let Some(level) = lookup("XRAY_LOG_LEVEL") {
            self.xray_log_level = level;
        }
        if let Some(path) = lookup("LOG_FILE") {
            self.log_file = Some(PathBuf::from(path)).filter(|p| !p.as_os_str().is_empty());
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.port_start == 0 {
            bail!("port_start must be between 1 and 65535");
        }
        if self.max_ports == 0 {
            bail!("max_ports must be at least 1");
        }
        if self.output_path.as_os_str().is_empty() {
            bail!("output_path must not be empty");
        }
        if self.fetch_timeout == 0 {
            bail!("fetch_timeout must be at least 1 second");
        }
        if !LOG_LEVELS.contains(&self.xray_log_level.as_str()) {
            bail!(
                "xray_log_level `{}` is not one of {}",
                self.xray_log_level,
                LOG_LEVELS.join(", ")
            );
        }
        Ok(())
    }

    pub fn parse_policy(&self) -> ParsePolicy {
        ParsePolicy {
            name_plus_as_space: self.name_plus_as_space,
            fill_plugin_defaults: self.fill_plugin_defaults,
            default_obfs_host: self.default_obfs_host.clone(),
        }
    }

    pub fn relay_options(&self) -> RelayOptions {
        RelayOptions {
            port_start: self.port_start,
            max_ports: self.max_ports,
            default_obfs_host: self.default_obfs_host.clone(),
            probe_ports: self.probe_ports,
            log_level: self.xray_log_level.clone(),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout)
    }
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_env<T>(key: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("invalid {} `{}`", key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => bail!("invalid {} `{}`, expected true or false", key, value),
    }
}
