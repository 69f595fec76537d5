//! Node report: diagnostics gathered while checking one node.
//!
//! Messages are split into node-scoped ("general") issues such as a missing
//! NSID, and per-zone issues keyed by the zone name as it appears in the
//! result record.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

const H1_SPACER: &str = "======================================";
const H2_SPACER: &str = "--------------------------------------";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeReport {
    node: String,
    general_messages: Vec<String>,
    domain_messages: BTreeMap<String, Vec<String>>,
}

impl NodeReport {
    pub fn new(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            ..Default::default()
        }
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn add_general(&mut self, message: impl Into<String>) {
        self.general_messages.push(message.into());
    }

    pub fn add_domain(&mut self, domain: &str, message: impl Into<String>) {
        self.domain_messages
            .entry(domain.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn general_messages(&self) -> &[String] {
        &self.general_messages
    }

    pub fn domain_messages(&self) -> &BTreeMap<String, Vec<String>> {
        &self.domain_messages
    }

    /// Messages recorded for one zone, empty if none.
    pub fn messages_for(&self, domain: &str) -> &[String] {
        self.domain_messages
            .get(domain)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.general_messages.is_empty() && self.domain_messages.is_empty()
    }

    pub fn diagnostic_count(&self) -> usize {
        self.general_messages.len() + self.domain_messages.values().map(Vec::len).sum::<usize>()
    }

    /// Plain-text error report, each section followed by two blank lines.
    /// Empty when nothing went wrong.
    pub fn render(&self) -> String {
        let mut out = String::new();
        if self.is_empty() {
            return out;
        }

        let _ = writeln!(out, "{}:", self.node);
        let _ = writeln!(out, "{H1_SPACER}");

        if !self.general_messages.is_empty() {
            let _ = writeln!(out, "General node errors");
            let _ = writeln!(out, "{H2_SPACER}");
            for message in &self.general_messages {
                let _ = writeln!(out, "\t{message}");
            }
            out.push_str("\n\n");
        }

        for (domain, messages) in &self.domain_messages {
            let _ = writeln!(out, "{domain}:");
            let _ = writeln!(out, "{H2_SPACER}");
            for message in messages {
                let _ = writeln!(out, "\t{message}");
            }
            out.push_str("\n\n");
        }

        out
    }
}
