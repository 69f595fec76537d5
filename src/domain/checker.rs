//! Consistency checks: node snapshots against live master serials.
//!
//! Pipeline per node:
//!   result record → identity checks → per-zone staleness + serial checks
//!
//! Every failure degrades to a diagnostic in the node's report; nothing here
//! aborts the checks of sibling nodes or zones.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::dns::MasterLookup;

use super::node_report::NodeReport;
use super::snapshot::{self, NodeSnapshot, SnapshotError};
use super::staleness::StalenessPolicy;

/// Outcome of checking one zone on one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainStatus {
    Pass,
    Fail,
}

pub struct Checker<L> {
    lookup: L,
    policy: StalenessPolicy,
    now: DateTime<Utc>,
    jobs: usize,
}

impl<L: MasterLookup> Checker<L> {
    /// A checker evaluating staleness against the current time, one node at a time.
    pub fn new(lookup: L, policy: StalenessPolicy) -> Self {
        Self {
            lookup,
            policy,
            now: Utc::now(),
            jobs: 1,
        }
    }

    /// Evaluate staleness against a fixed instant instead of the wall clock.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Check up to `jobs` nodes concurrently. Zero is treated as one.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn lookup(&self) -> &L {
        &self.lookup
    }

    /// Check one zone of a node's snapshot, recording diagnostics in `report`.
    pub async fn check_domain(
        &self,
        snapshot: &NodeSnapshot,
        domain: &str,
        report: &mut NodeReport,
    ) -> DomainStatus {
        let Some(record) = snapshot.domain(domain) else {
            report.add_domain(domain, "SOA not received");
            return DomainStatus::Fail;
        };

        let mut status = DomainStatus::Pass;

        if let Some(lag) = self.policy.is_stale(record.updated_at, self.now.timestamp()) {
            report.add_domain(domain, format!("SOA not received for {lag}"));
            status = DomainStatus::Fail;
        }

        match self.lookup.master_serial(domain).await {
            Ok(master) => {
                debug!(
                    domain,
                    master = %master.master_host,
                    master_ip = %master.master_ip,
                    master_serial = master.serial,
                    node_serial = record.serial,
                    "observed master serial"
                );
                if master.serial != record.serial {
                    report.add_domain(
                        domain,
                        format!(
                            "Node Serial ({}) does not match Master ({})",
                            record.serial, master.serial
                        ),
                    );
                    status = DomainStatus::Fail;
                }
            }
            Err(e) => {
                warn!(domain, error = %e, "master serial lookup failed");
                report.add_domain(domain, format!("Unable to verify master serial: {e}"));
                status = DomainStatus::Fail;
            }
        }

        status
    }

    /// Check the node whose result record lives at `record_path`.
    pub async fn check_node(&self, record_path: &Path, domains: &[String]) -> NodeReport {
        let node_name = snapshot::expected_node_name(record_path);
        let mut report = NodeReport::new(&node_name);

        let snapshot = match NodeSnapshot::load(record_path) {
            Ok(snapshot) => snapshot,
            Err(SnapshotError::Missing(path)) => {
                info!(path = %path.display(), "no result record for node");
                report.add_general("No data received from node");
                return report;
            }
            Err(e) => {
                warn!(error = %e, "unusable result record");
                report.add_general(format!("Unable to parse node data: {e}"));
                return report;
            }
        };

        match snapshot.identity() {
            None => report.add_general("No NSID received"),
            Some(claimed) => {
                if claimed != node_name {
                    report.add_general(format!("Incorrect NSID received: {claimed}"));
                }
                // Age only matters for an identity that was actually reported.
                if let Some(recorded_at) = snapshot.identity_recorded_at() {
                    if let Some(lag) = self.policy.is_stale(recorded_at, self.now.timestamp()) {
                        report.add_general(format!("NSID not received for {lag}"));
                    }
                }
            }
        }

        for domain in domains {
            let status = self.check_domain(&snapshot, domain, &mut report).await;
            debug!(domain = %domain, ?status, "zone checked");
        }

        report
    }

    /// Check every node in `nodes`, returning one report per entry in the
    /// same order. Duplicate names produce duplicate reports.
    pub async fn check_fleet(
        &self,
        nodes: &[String],
        results_directory: &Path,
        domains: &[String],
    ) -> Vec<NodeReport> {
        let paths: Vec<PathBuf> = nodes
            .iter()
            .map(|node| snapshot::record_path(results_directory, node))
            .collect();

        // `buffered` yields results in input order regardless of completion order.
        stream::iter(paths.iter().zip(nodes))
            .map(|(path, node)| {
                self.check_node(path, domains)
                    .instrument(info_span!("node", node = %node))
            })
            .buffered(self.jobs)
            .collect::<Vec<_>>()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::HashMap;
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::TimeZone;

    use crate::dns::LookupError;

    const NOW: i64 = 1_700_000_000;
    const DAY: i64 = 86_400;

    /// Scripted master serials per qualified zone; zones not listed fail to resolve.
    #[derive(Default)]
    struct ScriptedLookup {
        serials: HashMap<String, u32>,
        queries: AtomicUsize,
        /// Zones whose answers are delayed, to shuffle completion order.
        slow: HashMap<String, u64>,
    }

    impl ScriptedLookup {
        fn with(zones: &[(&str, u32)]) -> Self {
            Self {
                serials: zones.iter().map(|(z, s)| (z.to_string(), *s)).collect(),
                ..Default::default()
            }
        }

        fn query_count(&self) -> usize {
            self.queries.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MasterLookup for ScriptedLookup {
        async fn resolve_master(&self, domain: &str) -> Result<String, LookupError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            if let Some(ms) = self.slow.get(domain) {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
            }
            if self.serials.contains_key(domain) {
                Ok(format!("master.{domain}"))
            } else {
                Err(LookupError::NoRecords {
                    name: domain.to_string(),
                    record: "SOA",
                })
            }
        }

        async fn resolve_address(&self, _hostname: &str) -> Result<Ipv4Addr, LookupError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            Ok(Ipv4Addr::new(192, 0, 2, 53))
        }

        async fn query_serial(&self, domain: &str, _server: Ipv4Addr) -> Result<u32, LookupError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            self.serials
                .get(domain)
                .copied()
                .ok_or_else(|| LookupError::NoRecords {
                    name: domain.to_string(),
                    record: "SOA",
                })
        }
    }

    fn checker(lookup: ScriptedLookup) -> Checker<ScriptedLookup> {
        Checker::new(lookup, StalenessPolicy::default()).at(Utc.timestamp_opt(NOW, 0).unwrap())
    }

    fn snapshot_yaml(nsid: &str, nsid_updated: i64, zones: &[(&str, i64, u32)]) -> String {
        let mut yaml = format!("nsid:\n  value: '{nsid}'\n  updated: {nsid_updated}\ndomains:\n");
        if zones.is_empty() {
            yaml.push_str("  {}\n");
        }
        for (zone, updated, serial) in zones {
            yaml.push_str(&format!("  {zone}:\n    updated: {updated}\n    serial: {serial}\n"));
        }
        yaml
    }

    fn write_record(dir: &Path, node: &str, content: &str) -> PathBuf {
        let path = snapshot::record_path(dir, node);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn domains(names: &[&str]) -> Vec<String> {
        names.iter().map(|d| d.to_string()).collect()
    }

    #[tokio::test]
    async fn absent_domain_fails_without_dns_queries() {
        let checker = checker(ScriptedLookup::with(&[("example.com.", 10)]));
        let snapshot = NodeSnapshot::parse(&snapshot_yaml("ns1", NOW, &[])).unwrap();
        let mut report = NodeReport::new("ns1");

        let status = checker.check_domain(&snapshot, "example.com", &mut report).await;

        assert_eq!(status, DomainStatus::Fail);
        assert_eq!(report.messages_for("example.com"), ["SOA not received"]);
        assert_eq!(checker.lookup().query_count(), 0);
    }

    #[tokio::test]
    async fn fresh_matching_domain_passes() {
        let checker = checker(ScriptedLookup::with(&[("example.com.", 2024010101)]));
        let snapshot =
            NodeSnapshot::parse(&snapshot_yaml("ns1", NOW, &[("example.com", NOW, 2024010101)]))
                .unwrap();
        let mut report = NodeReport::new("ns1");

        let status = checker.check_domain(&snapshot, "example.com", &mut report).await;

        assert_eq!(status, DomainStatus::Pass);
        assert!(report.is_empty());
        assert_eq!(checker.lookup().query_count(), 3);
    }

    #[tokio::test]
    async fn serial_mismatch_reported_with_both_serials() {
        let checker = checker(ScriptedLookup::with(&[("example.com.", 12)]));
        let snapshot =
            NodeSnapshot::parse(&snapshot_yaml("ns1", NOW, &[("example.com", NOW, 11)])).unwrap();
        let mut report = NodeReport::new("ns1");

        let status = checker.check_domain(&snapshot, "example.com", &mut report).await;

        assert_eq!(status, DomainStatus::Fail);
        assert_eq!(
            report.messages_for("example.com"),
            ["Node Serial (11) does not match Master (12)"]
        );
    }

    #[tokio::test]
    async fn stale_message_precedes_mismatch() {
        let checker = checker(ScriptedLookup::with(&[("example.com.", 12)]));
        let snapshot = NodeSnapshot::parse(&snapshot_yaml(
            "ns1",
            NOW,
            &[("example.com", NOW - DAY - 3600, 11)],
        ))
        .unwrap();
        let mut report = NodeReport::new("ns1");

        let status = checker.check_domain(&snapshot, "example.com", &mut report).await;

        assert_eq!(status, DomainStatus::Fail);
        assert_eq!(
            report.messages_for("example.com"),
            [
                "SOA not received for 25.0 Hours",
                "Node Serial (11) does not match Master (12)"
            ]
        );
    }

    #[tokio::test]
    async fn stale_but_matching_domain_fails_once() {
        let checker = checker(ScriptedLookup::with(&[("example.com.", 11)]));
        let snapshot = NodeSnapshot::parse(&snapshot_yaml(
            "ns1",
            NOW,
            &[("example.com", NOW - 2 * DAY, 11)],
        ))
        .unwrap();
        let mut report = NodeReport::new("ns1");

        let status = checker.check_domain(&snapshot, "example.com", &mut report).await;

        assert_eq!(status, DomainStatus::Fail);
        assert_eq!(report.messages_for("example.com"), ["SOA not received for 48.0 Hours"]);
    }

    #[tokio::test]
    async fn lookup_failure_is_reported_instead_of_mismatch() {
        let checker = checker(ScriptedLookup::default());
        let snapshot =
            NodeSnapshot::parse(&snapshot_yaml("ns1", NOW, &[("example.com", NOW, 11)])).unwrap();
        let mut report = NodeReport::new("ns1");

        let status = checker.check_domain(&snapshot, "example.com", &mut report).await;

        assert_eq!(status, DomainStatus::Fail);
        let messages = report.messages_for("example.com");
        assert_eq!(messages.len(), 1);
        assert!(messages[0].starts_with("Unable to verify master serial:"));
        assert!(!messages[0].contains("does not match"));
    }

    #[tokio::test]
    async fn root_zone_is_queried_at_apex() {
        let checker = checker(ScriptedLookup::with(&[(".", 2024010100)]));
        let snapshot =
            NodeSnapshot::parse(&snapshot_yaml("ns1", NOW, &[("root", NOW, 2024010100)])).unwrap();
        let mut report = NodeReport::new("ns1");

        let status = checker.check_domain(&snapshot, "root", &mut report).await;

        assert_eq!(status, DomainStatus::Pass);
        assert!(report.is_empty());
    }

    #[tokio::test]
    async fn missing_record_yields_single_general_message() {
        let dir = tempfile::tempdir().unwrap();
        let checker = checker(ScriptedLookup::with(&[("example.com.", 1)]));

        let report = checker
            .check_node(&dir.path().join("ns1.yaml"), &domains(&["example.com"]))
            .await;

        assert_eq!(report.node(), "ns1");
        assert_eq!(report.general_messages(), ["No data received from node"]);
        assert!(report.domain_messages().is_empty());
        assert_eq!(checker.lookup().query_count(), 0);
    }

    #[tokio::test]
    async fn malformed_record_is_a_general_message() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_record(dir.path(), "ns1", "nsid: [broken");
        let checker = checker(ScriptedLookup::default());

        let report = checker.check_node(&path, &domains(&["example.com"])).await;

        assert_eq!(report.general_messages().len(), 1);
        assert!(report.general_messages()[0].starts_with("Unable to parse node data:"));
        assert!(report.domain_messages().is_empty());
    }

    #[tokio::test]
    async fn identity_checks() {
        let dir = tempfile::tempdir().unwrap();
        let checker = checker(ScriptedLookup::default());

        let path = write_record(dir.path(), "ns1.example.net", &snapshot_yaml("", NOW, &[]));
        let report = checker.check_node(&path, &[]).await;
        assert_eq!(report.node(), "ns1.example.net");
        assert_eq!(report.general_messages(), ["No NSID received"]);

        let path = write_record(
            dir.path(),
            "ns2.example.net",
            &snapshot_yaml("ns3.example.net", NOW, &[]),
        );
        let report = checker.check_node(&path, &[]).await;
        assert_eq!(
            report.general_messages(),
            ["Incorrect NSID received: ns3.example.net"]
        );

        let path = write_record(
            dir.path(),
            "ns4.example.net",
            &snapshot_yaml("ns4.example.net", NOW, &[]),
        );
        assert!(checker.check_node(&path, &[]).await.is_empty());
    }

    #[tokio::test]
    async fn stale_identity_is_a_general_message() {
        let dir = tempfile::tempdir().unwrap();
        let checker = checker(ScriptedLookup::default());
        let path = write_record(dir.path(), "ns1", &snapshot_yaml("ns1", NOW - DAY, &[]));

        let report = checker.check_node(&path, &[]).await;

        assert_eq!(report.general_messages(), ["NSID not received for 24.0 Hours"]);
        assert!(report.domain_messages().is_empty());
    }

    #[tokio::test]
    async fn blank_identity_is_not_also_reported_stale() {
        let dir = tempfile::tempdir().unwrap();
        let checker = checker(ScriptedLookup::default());
        let path = write_record(dir.path(), "ns1", &snapshot_yaml("", NOW - 2 * DAY, &[]));

        let report = checker.check_node(&path, &[]).await;

        assert_eq!(report.general_messages(), ["No NSID received"]);
    }

    #[tokio::test]
    async fn incomplete_zone_entry_only_fails_that_zone() {
        let dir = tempfile::tempdir().unwrap();
        let checker = checker(ScriptedLookup::with(&[("example.com.", 5), ("example.org.", 5)]));
        let record = format!(
            "nsid:\n  value: ns1\n  updated: {NOW}\ndomains:\n  \
             example.com:\n    updated: {NOW}\n    serial: 5\n  \
             example.org:\n    updated: {NOW}\n  \
             example.net: null\n"
        );
        let path = write_record(dir.path(), "ns1", &record);

        let report = checker.check_node(&path, &domains(&["example.com", "example.org"])).await;

        assert!(report.general_messages().is_empty());
        assert!(report.messages_for("example.com").is_empty());
        assert_eq!(report.messages_for("example.org"), ["SOA not received"]);
        assert!(report.messages_for("example.net").is_empty());
    }

    #[tokio::test]
    async fn node_checks_every_requested_domain() {
        let dir = tempfile::tempdir().unwrap();
        let checker = checker(ScriptedLookup::with(&[("example.com.", 5), ("example.org.", 9)]));
        let path = write_record(
            dir.path(),
            "ns1",
            &snapshot_yaml("ns1", NOW, &[("example.com", NOW, 5), ("example.org", NOW, 8)]),
        );

        let report = checker
            .check_node(&path, &domains(&["example.com", "example.org", "example.net"]))
            .await;

        assert!(report.general_messages().is_empty());
        assert!(report.messages_for("example.com").is_empty());
        assert_eq!(
            report.messages_for("example.org"),
            ["Node Serial (8) does not match Master (9)"]
        );
        assert_eq!(report.messages_for("example.net"), ["SOA not received"]);
    }

    #[tokio::test]
    async fn fleet_reports_follow_input_order() {
        let dir = tempfile::tempdir().unwrap();
        write_record(dir.path(), "ns1", &snapshot_yaml("ns1", NOW, &[]));
        write_record(dir.path(), "ns3", &snapshot_yaml("ns3", NOW, &[]));
        let checker = checker(ScriptedLookup::default());
        let nodes = domains(&["ns1", "ns2", "ns3"]);

        let reports = checker.check_fleet(&nodes, dir.path(), &[]).await;

        assert_eq!(reports.len(), 3);
        assert_eq!(reports[0].node(), "ns1");
        assert!(reports[0].is_empty());
        assert_eq!(reports[1].node(), "ns2");
        assert_eq!(reports[1].general_messages(), ["No data received from node"]);
        assert_eq!(reports[2].node(), "ns3");
        assert!(reports[2].is_empty());
    }

    #[tokio::test]
    async fn fleet_keeps_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let checker = checker(ScriptedLookup::default());
        let nodes = domains(&["ns1", "ns1."]);

        let reports = checker.check_fleet(&nodes, dir.path(), &[]).await;

        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0], reports[1]);
    }

    #[tokio::test]
    async fn concurrent_fleet_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        for node in ["ns1", "ns2", "ns3"] {
            let zone = format!("{node}.example");
            write_record(dir.path(), node, &snapshot_yaml(node, NOW, &[(zone.as_str(), NOW, 1)]));
        }
        // The first node answers last.
        let lookup = ScriptedLookup {
            serials: [("ns1.example.", 1), ("ns2.example.", 2), ("ns3.example.", 1)]
                .into_iter()
                .map(|(z, s)| (z.to_string(), s))
                .collect(),
            slow: [("ns1.example.".to_string(), 50)].into_iter().collect(),
            ..Default::default()
        };
        let checker = checker(lookup).with_jobs(3);
        let nodes = domains(&["ns1", "ns2", "ns3"]);
        let zones = domains(&["ns1.example", "ns2.example", "ns3.example"]);

        let reports = checker.check_fleet(&nodes, dir.path(), &zones).await;

        let names: Vec<&str> = reports.iter().map(NodeReport::node).collect();
        assert_eq!(names, ["ns1", "ns2", "ns3"]);
        // Each node only records its own zone, so the others are "not received".
        assert_eq!(reports[0].messages_for("ns1.example").len(), 0);
        assert_eq!(
            reports[1].messages_for("ns2.example"),
            ["Node Serial (1) does not match Master (2)"]
        );
        assert_eq!(reports[2].messages_for("ns1.example"), ["SOA not received"]);
    }
}
