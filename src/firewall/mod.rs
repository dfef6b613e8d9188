//! Firewall table synchronization
//!
//! Each logical network has a pf table of client addresses allowed to reach
//! it. Granting adds one address to every entitled network's table; revoking
//! deletes it. Tables are independent, so a failure on one is recorded and
//! the pass continues with the rest.

pub mod pfctl;

pub use pfctl::Pfctl;

use crate::session::NetworkSet;
use async_trait::async_trait;
use std::net::Ipv4Addr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum FirewallError {
    #[error("Failed to run control utility for table {table}: {message}")]
    Spawn { table: String, message: String },
    #[error("Control utility failed for table {table} (exit {code:?}): {stderr}")]
    Exit {
        table: String,
        code: Option<i32>,
        stderr: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableOp {
    Add,
    Delete,
}

impl TableOp {
    pub fn as_arg(&self) -> &'static str {
        match self {
            TableOp::Add => "add",
            TableOp::Delete => "delete",
        }
    }
}

/// Single-address table mutation, the way the control utility exposes it
#[async_trait]
pub trait FirewallControl: Send + Sync {
    async fn run(&self, table: &str, op: TableOp, address: Ipv4Addr) -> Result<(), FirewallError>;
}

/// Table holding the clients of a network
pub fn table_name(codename: &str, suffix: &str) -> String {
    format!("{}{}", codename, suffix)
}

/// Result of one table mutation
#[derive(Debug)]
pub struct NetworkOutcome {
    pub codename: String,
    pub table: String,
    pub result: Result<(), FirewallError>,
}

/// Per-network outcomes of a grant or revoke pass
#[derive(Debug, Default)]
pub struct SyncReport {
    skipped: bool,
    outcomes: Vec<NetworkOutcome>,
}

impl SyncReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            outcomes: Vec::new(),
        }
    }

    /// True when synchronization is administratively disabled
    pub fn is_skipped(&self) -> bool {
        self.skipped
    }

    pub fn outcomes(&self) -> &[NetworkOutcome] {
        &self.outcomes
    }

    pub fn failures(&self) -> impl Iterator<Item = &NetworkOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }
}

pub struct FirewallSynchronizer {
    enabled: bool,
    suffix: String,
    control: Arc<dyn FirewallControl>,
}

impl FirewallSynchronizer {
    pub fn new(enabled: bool, suffix: impl Into<String>, control: Arc<dyn FirewallControl>) -> Self {
        Self {
            enabled,
            suffix: suffix.into(),
            control,
        }
    }

    /// Add the client's real source address to every entitled network
    pub async fn grant(&self, networks: &NetworkSet, peer_addr: Ipv4Addr) -> SyncReport {
        self.apply(networks, TableOp::Add, peer_addr).await
    }

    /// Remove the client's tunnel address from every entitled network
    pub async fn revoke(&self, networks: &NetworkSet, local_addr: Ipv4Addr) -> SyncReport {
        self.apply(networks, TableOp::Delete, local_addr).await
    }

    async fn apply(&self, networks: &NetworkSet, op: TableOp, address: Ipv4Addr) -> SyncReport {
        if !self.enabled {
            debug!("Firewall sync disabled, skipping {} of {}", op.as_arg(), address);
            return SyncReport::skipped();
        }

        let mut outcomes = Vec::with_capacity(networks.len());
        for codename in networks.iter() {
            let table = table_name(codename, &self.suffix);
            debug!("{} {} on table {}", op.as_arg(), address, table);

            let result = self.control.run(&table, op, address).await;
            if let Err(e) = &result {
                warn!("Failed to {} {} on {}: {} (continuing)", op.as_arg(), address, table, e);
            }

            outcomes.push(NetworkOutcome {
                codename: codename.to_string(),
                table,
                result,
            });
        }

        let report = SyncReport {
            skipped: false,
            outcomes,
        };
        info!(
            "{} {} on {} tables ({} failed)",
            op.as_arg(),
            address,
            report.outcomes.len(),
            report.failures().count()
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records every call; fails for tables listed in `fail_tables`
    #[derive(Default)]
    struct RecordingControl {
        calls: Mutex<Vec<(String, TableOp, Ipv4Addr)>>,
        fail_tables: Vec<String>,
    }

    #[async_trait]
    impl FirewallControl for RecordingControl {
        async fn run(&self, table: &str, op: TableOp, address: Ipv4Addr) -> Result<(), FirewallError> {
            self.calls.lock().unwrap().push((table.to_string(), op, address));
            if self.fail_tables.iter().any(|t| t == table) {
                return Err(FirewallError::Exit {
                    table: table.to_string(),
                    code: Some(1),
                    stderr: "no such table".to_string(),
                });
            }
            Ok(())
        }
    }

    fn networks(names: &[&str]) -> NetworkSet {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_table_name() {
        assert_eq!(table_name("red", "_clients"), "red_clients");
        assert_eq!(table_name("alpha_bob", "_vpn"), "alpha_bob_vpn");
    }

    #[test]
    fn test_table_op_args() {
        assert_eq!(TableOp::Add.as_arg(), "add");
        assert_eq!(TableOp::Delete.as_arg(), "delete");
    }

    #[tokio::test]
    async fn test_grant_adds_to_every_table() {
        let control = Arc::new(RecordingControl::default());
        let sync = FirewallSynchronizer::new(true, "_clients", control.clone());
        let peer = Ipv4Addr::new(10, 0, 0, 5);

        let report = sync.grant(&networks(&["red", "blue"]), peer).await;

        assert!(!report.has_failures());
        let calls = control.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![
                ("blue_clients".to_string(), TableOp::Add, peer),
                ("red_clients".to_string(), TableOp::Add, peer),
            ]
        );
    }

    #[tokio::test]
    async fn test_revoke_deletes_from_every_table() {
        let control = Arc::new(RecordingControl::default());
        let sync = FirewallSynchronizer::new(true, "_clients", control.clone());
        let local = Ipv4Addr::new(10, 8, 0, 12);

        let report = sync.revoke(&networks(&["red"]), local).await;

        assert_eq!(report.outcomes().len(), 1);
        assert_eq!(
            control.calls.lock().unwrap().as_slice(),
            &[("red_clients".to_string(), TableOp::Delete, local)]
        );
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_fan_out() {
        let control = Arc::new(RecordingControl {
            fail_tables: vec!["blue_clients".to_string()],
            ..Default::default()
        });
        let sync = FirewallSynchronizer::new(true, "_clients", control.clone());

        let report = sync
            .grant(&networks(&["blue", "green", "red"]), Ipv4Addr::new(10, 0, 0, 5))
            .await;

        assert_eq!(control.calls.lock().unwrap().len(), 3);
        assert!(report.has_failures());
        let failed: Vec<_> = report.failures().map(|o| o.codename.as_str()).collect();
        assert_eq!(failed, vec!["blue"]);
    }

    #[tokio::test]
    async fn test_disabled_is_noop() {
        let control = Arc::new(RecordingControl::default());
        let sync = FirewallSynchronizer::new(false, "_clients", control.clone());

        let report = sync
            .grant(&networks(&["red"]), Ipv4Addr::new(10, 0, 0, 5))
            .await;

        assert!(report.is_skipped());
        assert!(!report.has_failures());
        assert!(control.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_set_makes_no_calls() {
        let control = Arc::new(RecordingControl::default());
        let sync = FirewallSynchronizer::new(true, "_clients", control.clone());

        let report = sync.revoke(&NetworkSet::default(), Ipv4Addr::new(10, 8, 0, 12)).await;

        assert!(!report.is_skipped());
        assert!(report.outcomes().is_empty());
        assert!(control.calls.lock().unwrap().is_empty());
    }
}
