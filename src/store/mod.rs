//! External store adapters
//!
//! The engine only talks to the database and the cache through the traits
//! below, so every interaction can be bounded by a timeout and replaced by
//! an in-memory fake in tests.
//!
//! - `mysql`: identity store (entitlement query) and session ledger
//! - `memcache`: shared session/admission flags

pub mod memcache;
pub mod mysql;

pub use self::memcache::MemcacheStore;
pub use self::mysql::MysqlStore;

use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Malformed store response: {0}")]
    Query(String),
    #[error("Stored procedure {name} failed: {message}")]
    Procedure { name: &'static str, message: String },
}

/// One row of the entitlement union query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntitlementRow {
    /// Codename of an active network that is public or granted to the identity
    Network(Option<String>),
    /// Name of a target the identity owns an instance of
    OwnedTarget(Option<String>),
}

/// Server-side session transactions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Procedure {
    Login,
    Logout,
}

impl Procedure {
    pub fn name(&self) -> &'static str {
        match self {
            Procedure::Login => "VPN_LOGIN",
            Procedure::Logout => "VPN_LOGOUT",
        }
    }
}

/// Read-only access to the shared key-value cache
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// `Ok(None)` is a cache miss
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
}

#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Run the entitlement union query for one identity
    async fn entitlement_rows(&self, identity: &str) -> Result<Vec<EntitlementRow>, StoreError>;
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Invoke a session procedure; addresses are dotted-decimal text and are
    /// converted to the native representation by the store
    async fn call(
        &self,
        procedure: Procedure,
        identity: &str,
        local_addr: &str,
        peer_addr: &str,
    ) -> Result<(), StoreError>;
}

/// Run a store future with an upper bound on its duration
pub async fn bounded<T, F>(timeout: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Unavailable(format!(
            "timed out after {}ms",
            timeout.as_millis()
        ))),
    }
}
