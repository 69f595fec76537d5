mod commands;
mod config;
mod dns;
mod domain;
mod telemetry;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "zonewatch",
    version,
    about = "Audit zone-transfer health across a fleet of secondary nameservers"
)]
struct Cli {
    /// Path to config file (default: ~/.config/zonewatch/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (overrides config, `RUST_LOG` overrides both)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check every node's result record against the live zone masters
    Check {
        /// File containing the nodes to report on, one per line
        #[arg(short = 'N', long)]
        node_file: Option<PathBuf>,

        /// Directory the collector writes node results into
        #[arg(short = 'R', long, value_name = "DIR")]
        results_directory: Option<PathBuf>,

        /// Comma separated list of zones every node should serve
        #[arg(short = 'D', long)]
        domains: Option<String>,

        /// Allowed age of recorded data, in seconds
        #[arg(long, value_name = "SECS")]
        max_lag: Option<u64>,

        /// Number of nodes checked concurrently
        #[arg(long)]
        jobs: Option<usize>,

        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Show the live master and SOA serial of one or more zones
    Master {
        /// Zones to look up (`root` for the root zone)
        #[arg(required = true)]
        domains: Vec<String>,

        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut cfg = config::load(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        cfg.log_level = level;
    }
    telemetry::init(&cfg.log_level, cfg.log_format);

    match cli.command {
        Commands::Check {
            node_file,
            results_directory,
            domains,
            max_lag,
            jobs,
            format,
        } => {
            // CLI flags override config values
            if let Some(path) = node_file {
                cfg.node_file = path;
            }
            if let Some(dir) = results_directory {
                cfg.results_directory = dir;
            }
            if let Some(list) = domains {
                cfg.domains = config::parse_domain_list(&list);
            }
            if let Some(secs) = max_lag {
                cfg.max_lag_secs = secs;
            }
            if let Some(jobs) = jobs {
                cfg.jobs = jobs;
            }
            commands::check::run(&cfg, &format)
        }
        Commands::Master { domains, format } => commands::master::run(&domains, &format),
    }
}
