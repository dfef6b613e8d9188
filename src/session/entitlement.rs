//! Network entitlement resolution
//!
//! An identity may reach every active network that is public or explicitly
//! granted to it, plus one private network per target instance it owns. The
//! set is recomputed from the identity store on every call.

use super::SessionError;
use crate::store::{EntitlementRow, IdentityStore, StoreError, bounded};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Set of network codenames, iterated in sorted order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct NetworkSet(BTreeSet<String>);

impl NetworkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the codename was already present
    pub fn insert(&mut self, codename: impl Into<String>) -> bool {
        self.0.insert(codename.into())
    }

    pub fn contains(&self, codename: &str) -> bool {
        self.0.contains(codename)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl FromIterator<String> for NetworkSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl std::fmt::Display for NetworkSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.iter().collect();
        write!(f, "[{}]", names.join(", "))
    }
}

/// Codename of the private network backing an owned target instance
pub fn synthetic_codename(target: &str, identity: &str) -> String {
    format!("{}_{}", target, identity).to_lowercase()
}

pub struct EntitlementResolver {
    store: Arc<dyn IdentityStore>,
    timeout: Duration,
}

impl EntitlementResolver {
    pub fn new(store: Arc<dyn IdentityStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Networks the identity may reach. No entitlements is an empty set.
    pub async fn resolve(&self, identity: &str) -> Result<NetworkSet, SessionError> {
        let rows = bounded(self.timeout, self.store.entitlement_rows(identity))
            .await
            .map_err(|e| match e {
                StoreError::Unavailable(msg) => SessionError::StoreUnavailable(msg),
                other => SessionError::QueryError(other.to_string()),
            })?;

        let mut networks = NetworkSet::new();
        for row in rows {
            let codename = match row {
                EntitlementRow::Network(Some(name)) if !name.trim().is_empty() => name,
                EntitlementRow::OwnedTarget(Some(name)) if !name.trim().is_empty() => {
                    synthetic_codename(&name, identity)
                }
                other => {
                    return Err(SessionError::QueryError(format!(
                        "empty codename in {:?}",
                        other
                    )));
                }
            };

            if !networks.insert(codename.clone()) {
                debug!("Duplicate network {} for {} collapsed", codename, identity);
            }
        }

        debug!("{} is entitled to {}", identity, networks);
        Ok(networks)
    }
}
