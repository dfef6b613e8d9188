//! Session admission and network entitlement
//!
//! - `entitlement`: which networks an identity may reach
//! - `guard`: admission flag and duplicate-session check
//! - `ledger`: login/logout records through stored procedures
//! - `orchestrator`: the connect and disconnect transitions

pub mod entitlement;
pub mod guard;
pub mod ledger;
pub mod orchestrator;

pub use entitlement::{EntitlementResolver, NetworkSet, synthetic_codename};
pub use guard::{FlagRead, SessionGuard, UnknownAs};
pub use ledger::SessionLedger;
pub use orchestrator::{EventOutcome, Orchestrator, SessionState};

use crate::store::StoreError;
use thiserror::Error;

/// Failures that end an event without granting anything.
///
/// Firewall failures are deliberately absent: they are reported per network
/// in a `SyncReport` and never abort an event.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Identity store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("Malformed entitlement result: {0}")]
    QueryError(String),
    #[error("{procedure} failed: {source}")]
    LedgerError {
        procedure: &'static str,
        source: StoreError,
    },
    #[error("Admission is closed")]
    AdmissionClosed,
    #[error("Client {0} already has an active session")]
    DuplicateSession(String),
}
