//! `zonewatch master <domain>...`: show the live master and serial of zones.

use anyhow::{bail, Result};
use colored::Colorize;

use crate::dns::{self, MasterLookup, SystemLookup};

pub fn run(domains: &[String], format: &str) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    let failures = rt.block_on(async {
        let lookup = SystemLookup::from_system_or_default();
        let mut failures = 0usize;
        let mut observations = Vec::new();

        for domain in domains {
            let result = lookup.master_serial(domain).await;
            if result.is_err() {
                failures += 1;
            }
            match format {
                "json" => observations.push(serde_json::json!({
                    "domain": domain,
                    "zone": dns::qualify(domain),
                    "master": result.as_ref().ok(),
                    "error": result.as_ref().err().map(ToString::to_string),
                })),
                _ => print_observation(domain, &result),
            }
        }

        if format == "json" {
            println!("{}", serde_json::to_string_pretty(&observations)?);
        }
        anyhow::Ok(failures)
    })?;

    if failures > 0 {
        bail!("{} of {} lookups failed", failures, domains.len());
    }
    Ok(())
}

fn print_observation(
    domain: &str,
    result: &Result<dns::MasterSerialObservation, dns::LookupError>,
) {
    match result {
        Ok(master) => {
            println!("{} {}", "ok".green().bold(), dns::qualify(domain).bold());
            println!("  master:  {} ({})", master.master_host, master.master_ip);
            println!("  serial:  {}", master.serial);
        }
        Err(e) => {
            println!("{} {}", "!!".red().bold(), dns::qualify(domain).bold());
            println!("  error:   {}", e);
        }
    }
}
