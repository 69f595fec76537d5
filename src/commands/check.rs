//! `zonewatch check`: audit every node in the node list.

use anyhow::Result;
use colored::Colorize;
use tracing::info;

use crate::config::{self, Config};
use crate::dns::SystemLookup;
use crate::domain::checker::Checker;
use crate::domain::node_report::NodeReport;

pub fn run(config: &Config, format: &str) -> Result<()> {
    let nodes = config::read_node_list(&config.node_file)?;

    let rt = tokio::runtime::Runtime::new()?;
    let reports = rt.block_on(async {
        let lookup = SystemLookup::from_system_or_default();
        let checker = Checker::new(lookup, config.staleness()).with_jobs(config.jobs);

        info!(
            nodes = nodes.len(),
            domains = config.domains.len(),
            results_directory = %config.results_directory.display(),
            "checking fleet"
        );
        checker
            .check_fleet(&nodes, &config.results_directory, &config.domains)
            .await
    });

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&reports)?);
        }
        _ => {
            for report in &reports {
                print!("{}", report.render());
            }
        }
    }

    let failing = print_summary(&reports);
    if failing > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// Print a one-line summary to stderr and return the number of failing nodes.
fn print_summary(reports: &[NodeReport]) -> usize {
    let failing = reports.iter().filter(|r| !r.is_empty()).count();
    let diagnostics: usize = reports.iter().map(NodeReport::diagnostic_count).sum();

    if failing == 0 {
        eprintln!(
            "{} {} nodes checked, all consistent",
            "ok".green().bold(),
            reports.len()
        );
    } else {
        eprintln!(
            "{} {} of {} nodes with problems ({} diagnostics)",
            "!!".red().bold(),
            failing,
            reports.len(),
            diagnostics
        );
    }
    failing
}
