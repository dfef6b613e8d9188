//! Session start/end records
//!
//! Both records go through server-side procedures so the store can enforce
//! its own rules (such as refusing a second open session). Calls are made
//! once; a failure is returned to the caller, never retried.

use super::SessionError;
use crate::store::{LedgerStore, Procedure, bounded};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

pub struct SessionLedger {
    store: Arc<dyn LedgerStore>,
    timeout: Duration,
}

impl SessionLedger {
    pub fn new(store: Arc<dyn LedgerStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub async fn record_login(
        &self,
        identity: &str,
        local_addr: Ipv4Addr,
        peer_addr: Ipv4Addr,
    ) -> Result<(), SessionError> {
        self.record(Procedure::Login, identity, local_addr, peer_addr)
            .await
    }

    pub async fn record_logout(
        &self,
        identity: &str,
        local_addr: Ipv4Addr,
        peer_addr: Ipv4Addr,
    ) -> Result<(), SessionError> {
        self.record(Procedure::Logout, identity, local_addr, peer_addr)
            .await
    }

    async fn record(
        &self,
        procedure: Procedure,
        identity: &str,
        local_addr: Ipv4Addr,
        peer_addr: Ipv4Addr,
    ) -> Result<(), SessionError> {
        let local = local_addr.to_string();
        let peer = peer_addr.to_string();
        debug!("CALL {}({}, {}, {})", procedure.name(), identity, local, peer);

        bounded(
            self.timeout,
            self.store.call(procedure, identity, &local, &peer),
        )
        .await
        .map_err(|source| {
            error!("{} failed for {}: {}", procedure.name(), identity, source);
            SessionError::LedgerError {
                procedure: procedure.name(),
                source,
            }
        })
    }
}
