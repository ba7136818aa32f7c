use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::{Env, Target};
use log::{error, info};

use subrelay::interfaces::relay::{build_relay_config, run, ConverterFetcher, RunReport};
use subrelay::Settings;

/// Turn proxy subscriptions into a multi-port Xray relay configuration
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the settings file (TOML or YAML)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output path of the generated Xray config
    #[arg(short, long, value_name = "OUTPUT_FILE")]
    output: Option<PathBuf>,

    /// Local port of the first relay
    #[arg(long, value_name = "PORT")]
    port_start: Option<u16>,

    /// Maximum number of nodes turned into relays
    #[arg(long, value_name = "COUNT")]
    max_ports: Option<usize>,

    /// Skip the local port availability check
    #[arg(long)]
    no_probe: bool,

    /// Print the generated config to stdout instead of writing it
    #[arg(long)]
    dry_run: bool,

    /// Subscription URLs, replacing the configured ones
    #[arg(value_name = "URL")]
    subscriptions: Vec<String>,
}

fn load_settings(args: &Args) -> Result<Settings> {
    let mut settings = match &args.config {
        Some(path) => Settings::load_from_file(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => Settings::default(),
    };
    settings
        .apply_env()
        .context("invalid environment configuration")?;

    if let Some(output) = &args.output {
        settings.output_path = output.clone();
    }
    if let Some(port_start) = args.port_start {
        settings.port_start = port_start;
    }
    if let Some(max_ports) = args.max_ports {
        settings.max_ports = max_ports;
    }
    if args.no_probe {
        settings.probe_ports = false;
    }
    if !args.subscriptions.is_empty() {
        settings.subscriptions = args.subscriptions.clone();
    }

    settings.validate()?;
    Ok(settings)
}

fn init_logger(log_file: Option<&Path>) {
    let mut builder = env_logger::Builder::from_env(Env::default().default_filter_or("info"));
    if let Some(path) = log_file {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                builder.target(Target::Pipe(Box::new(file)));
            }
            Err(e) => eprintln!(
                "Failed to open log file {}: {}, logging to stderr",
                path.display(),
                e
            ),
        }
    }
    builder.init();
}

fn log_report(report: &RunReport) {
    info!(
        "Run finished: {} failed sources, {} malformed links, {} nodes without a port",
        report.failed_sources.len(),
        report.malformed_lines.len(),
        report.skipped_nodes.len()
    );
}

fn main() {
    let args = Args::parse();

    let settings = match load_settings(&args) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(2);
        }
    };

    init_logger(settings.log_file.as_deref());

    if settings.subscriptions.is_empty() {
        error!("No subscription configured");
    }

    let fetcher = ConverterFetcher::from_settings(&settings);

    if args.dry_run {
        let mut report = RunReport::default();
        let config = match build_relay_config(&settings, &fetcher, &mut report) {
            Ok(config) => config,
            Err(e) => {
                error!("Failed to generate config: {}", e);
                std::process::exit(1);
            }
        };
        log_report(&report);
        match config.map(|config| serde_json::to_string_pretty(&config)) {
            Some(Ok(json)) => println!("{}", json),
            Some(Err(e)) => {
                error!("Failed to serialize config: {}", e);
                std::process::exit(1);
            }
            None => info!("No valid nodes found"),
        }
        return;
    }

    match run(&settings, &fetcher) {
        Ok(report) => log_report(&report),
        Err(e) => {
            error!("Failed to write config to {}: {}", settings.output_path.display(), e);
            std::process::exit(1);
        }
    }
}
