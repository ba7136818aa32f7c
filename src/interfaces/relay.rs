//! Subscription to relay pipeline
//!
//! One run fetches every subscription through the converter, parses each
//! returned line, builds the relay document and writes it. Failures of a
//! single source, line or node are logged, recorded in the [`RunReport`] and
//! skipped. Only a failure to produce or write the document ends the run.

use std::time::Duration;

use log::{debug, info, warn};

use crate::generator::{proxy_to_xray, SkippedNode};
use crate::models::{SsNode, XrayConfig};
use crate::parser::{explode_ss, MalformedUri, ParsePolicy};
use crate::settings::Settings;
use crate::utils::file::{persist_config, PersistError};
use crate::utils::http::{converter_request_url, web_get, FetchError};

/// Source of raw subscription content, one link per line.
pub trait SubscriptionFetcher {
    fn fetch(&self, subscription: &str) -> Result<String, FetchError>;
}

/// Fetches subscriptions through a subscription converter's `target=ss` list output.
#[derive(Debug, Clone)]
pub struct ConverterFetcher {
    api: String,
    timeout: Duration,
}

impl ConverterFetcher {
    pub fn new(api: &str, timeout: Duration) -> Self {
        ConverterFetcher {
            api: api.to_string(),
            timeout,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        ConverterFetcher::new(&settings.subconverter_api, settings.request_timeout())
    }
}

impl SubscriptionFetcher for ConverterFetcher {
    fn fetch(&self, subscription: &str) -> Result<String, FetchError> {
        let url = converter_request_url(&self.api, subscription);
        debug!("Converter request: {}", url);
        web_get(&url, self.timeout)
    }
}

#[derive(Debug)]
pub struct FailedSource {
    pub subscription: String,
    pub error: FetchError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedLine {
    pub line: String,
    pub error: MalformedUri,
}

/// What happened during one run.
#[derive(Debug, Default)]
pub struct RunReport {
    pub failed_sources: Vec<FailedSource>,
    pub malformed_lines: Vec<MalformedLine>,
    pub skipped_nodes: Vec<SkippedNode>,
    pub parsed_nodes: usize,
    /// Relays in the written document, `None` if nothing was written
    pub relays_written: Option<usize>,
}

/// Fetch every subscription and collect the non-empty lines, in source order.
pub fn fetch_links(
    fetcher: &dyn SubscriptionFetcher,
    subscriptions: &[String],
    report: &mut RunReport,
) -> Vec<String> {
    let mut links = Vec::new();
    for subscription in subscriptions {
        info!("Processing subscription: {}", subscription);
        match fetcher.fetch(subscription) {
            Ok(body) => {
                let before = links.len();
                links.extend(
                    body.lines()
                        .map(str::trim)
                        .filter(|line| !line.is_empty())
                        .map(str::to_string),
                );
                info!("Got {} links from {}", links.len() - before, subscription);
            }
            Err(error) => {
                warn!("Failed to fetch subscription {}: {}", subscription, error);
                report.failed_sources.push(FailedSource {
                    subscription: subscription.clone(),
                    error,
                });
            }
        }
    }
    links
}

/// Parse every link, keeping the valid nodes in input order.
pub fn parse_links(links: &[String], policy: &ParsePolicy, report: &mut RunReport) -> Vec<SsNode> {
    let mut nodes = Vec::new();
    for line in links {
        match explode_ss(line, policy) {
            Ok(node) => nodes.push(node),
            Err(error) => {
                warn!("Skipping link {}: {}", line, error);
                report.malformed_lines.push(MalformedLine {
                    line: line.clone(),
                    error,
                });
            }
        }
    }
    report.parsed_nodes = nodes.len();
    nodes
}

/// Fetch, parse and generate without writing anything.
///
/// Returns `Ok(None)` when no subscription yielded a valid node.
pub fn build_relay_config(
    settings: &Settings,
    fetcher: &dyn SubscriptionFetcher,
    report: &mut RunReport,
) -> Result<Option<XrayConfig>, PersistError> {
    let links = fetch_links(fetcher, &settings.subscriptions, report);
    let nodes = parse_links(&links, &settings.parse_policy(), report);
    if nodes.is_empty() {
        return Ok(None);
    }

    let synthesis = proxy_to_xray(&nodes, &settings.relay_options())?;
    report.skipped_nodes = synthesis.skipped;
    Ok(Some(synthesis.config))
}

/// Run the whole pipeline and write the result to `settings.output_path`.
///
/// With no valid node the existing file is left alone and the run still
/// succeeds. An `Err` means the document could not be written; the previous
/// file, if any, is intact.
pub fn run(settings: &Settings, fetcher: &dyn SubscriptionFetcher) -> Result<RunReport, PersistError> {
    let mut report = RunReport::default();

    match build_relay_config(settings, fetcher, &mut report)? {
        Some(config) => {
            persist_config(&config, &settings.output_path)?;
            info!(
                "Config updated with {} relays from {} nodes",
                config.relay_count(),
                report.parsed_nodes
            );
            report.relays_written = Some(config.relay_count());
        }
        None => warn!("No valid nodes found, keeping the existing config"),
    }

    Ok(report)
}
