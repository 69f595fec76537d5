pub mod checker;
pub mod node_report;
pub mod snapshot;
pub mod staleness;
