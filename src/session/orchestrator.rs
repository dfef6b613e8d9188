//! Connect and disconnect transitions
//!
//! ```text
//! Idle -> Connecting    -> Admitted | Rejected
//! Idle -> Disconnecting -> Released | DisconnectFailed
//! ```
//!
//! Connect never touches the firewall before the login is recorded. Once the
//! login or logout is recorded, firewall failures only produce warnings.

use super::{EntitlementResolver, NetworkSet, SessionError, SessionGuard, SessionLedger};
use crate::firewall::{FirewallSynchronizer, SyncReport};
use std::net::Ipv4Addr;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Admitted,
    Rejected,
    Disconnecting,
    Released,
    DisconnectFailed,
}

/// A successfully completed event
#[derive(Debug)]
pub struct EventOutcome {
    /// `Admitted` or `Released`
    pub state: SessionState,
    pub networks: NetworkSet,
    pub firewall: SyncReport,
}

impl EventOutcome {
    /// True when at least one network's table could not be updated
    pub fn has_soft_failures(&self) -> bool {
        self.firewall.has_failures()
    }
}

pub struct Orchestrator {
    guard: SessionGuard,
    ledger: SessionLedger,
    resolver: EntitlementResolver,
    firewall: FirewallSynchronizer,
}

impl Orchestrator {
    pub fn new(
        guard: SessionGuard,
        ledger: SessionLedger,
        resolver: EntitlementResolver,
        firewall: FirewallSynchronizer,
    ) -> Self {
        Self {
            guard,
            ledger,
            resolver,
            firewall,
        }
    }

    /// Admit a client and open its networks to its real source address.
    ///
    /// Any error means the event ended `Rejected`.
    pub async fn client_connect(
        &self,
        identity: &str,
        local_addr: Ipv4Addr,
        peer_addr: Ipv4Addr,
    ) -> Result<EventOutcome, SessionError> {
        transition(identity, SessionState::Idle, SessionState::Connecting);

        if !self.guard.is_admission_open().await {
            return Err(rejected(identity, SessionError::AdmissionClosed));
        }

        if self.guard.is_session_active(identity).await {
            return Err(rejected(
                identity,
                SessionError::DuplicateSession(identity.to_string()),
            ));
        }

        info!("Logging in client {}", identity);
        self.ledger
            .record_login(identity, local_addr, peer_addr)
            .await
            .map_err(|e| rejected(identity, e))?;

        let networks = self
            .resolver
            .resolve(identity)
            .await
            .map_err(|e| rejected(identity, e))?;

        let firewall = self.firewall.grant(&networks, peer_addr).await;
        if firewall.has_failures() {
            warn!(
                "Client {} admitted but {} of {} networks could not be opened",
                identity,
                firewall.failures().count(),
                networks.len()
            );
        }

        transition(identity, SessionState::Connecting, SessionState::Admitted);
        info!(
            "Client {} logged in successfully (local: {}, remote: {})",
            identity, local_addr, peer_addr
        );

        Ok(EventOutcome {
            state: SessionState::Admitted,
            networks,
            firewall,
        })
    }

    /// Record the logout and close the client's networks to its tunnel address.
    ///
    /// Any error means the event ended `DisconnectFailed`.
    pub async fn client_disconnect(
        &self,
        identity: &str,
        local_addr: Ipv4Addr,
        peer_addr: Ipv4Addr,
    ) -> Result<EventOutcome, SessionError> {
        transition(identity, SessionState::Idle, SessionState::Disconnecting);

        self.ledger
            .record_logout(identity, local_addr, peer_addr)
            .await
            .map_err(|e| disconnect_failed(identity, e))?;

        // Entitlement may have changed since connect; recompute it
        let networks = self
            .resolver
            .resolve(identity)
            .await
            .map_err(|e| disconnect_failed(identity, e))?;

        let firewall = self.firewall.revoke(&networks, local_addr).await;
        if firewall.has_failures() {
            warn!(
                "Client {} released but {} of {} networks could not be closed",
                identity,
                firewall.failures().count(),
                networks.len()
            );
        }

        transition(identity, SessionState::Disconnecting, SessionState::Released);
        info!(
            "Disconnected client {} successfully (local: {}, remote: {})",
            identity, local_addr, peer_addr
        );

        Ok(EventOutcome {
            state: SessionState::Released,
            networks,
            firewall,
        })
    }
}

fn transition(identity: &str, from: SessionState, to: SessionState) {
    debug!("{}: {:?} -> {:?}", identity, from, to);
}

fn rejected(identity: &str, err: SessionError) -> SessionError {
    transition(identity, SessionState::Connecting, SessionState::Rejected);
    error!("Rejecting client {}: {}", identity, err);
    err
}

fn disconnect_failed(identity: &str, err: SessionError) -> SessionError {
    transition(
        identity,
        SessionState::Disconnecting,
        SessionState::DisconnectFailed,
    );
    error!("Disconnect of client {} failed: {}", identity, err);
    err
}
