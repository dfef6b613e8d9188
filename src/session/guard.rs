//! Admission and duplicate-session checks
//!
//! Both flags live in the shared cache, and a failed read is resolved by an
//! explicit per-flag policy rather than silently:
//!
//! | Flag | Key | Unreadable means |
//! |------|-----|------------------|
//! | admission | `sysconfig:event_active` | closed |
//! | session | `ovpn:<identity>` | session present |
//!
//! Both directions reject the connect when the cache cannot answer.

use crate::store::{KeyValueStore, StoreError, bounded};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const ADMISSION_KEY: &str = "sysconfig:event_active";
pub const ADMISSION_OPEN: &str = "1";

pub fn session_key(identity: &str) -> String {
    format!("ovpn:{}", identity)
}

/// Outcome of reading one flag
#[derive(Debug)]
pub enum FlagRead {
    /// Cache miss
    Missing,
    Value(String),
    /// Error or timeout; the caller's policy decides what it means
    Unreadable(StoreError),
}

/// How an unreadable flag is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownAs {
    Absent,
    Present,
}

impl FlagRead {
    /// Whether the flag exists, with `Unreadable` resolved by `policy`
    pub fn is_present(&self, policy: UnknownAs) -> bool {
        match self {
            FlagRead::Missing => false,
            FlagRead::Value(_) => true,
            FlagRead::Unreadable(_) => policy == UnknownAs::Present,
        }
    }
}

pub struct SessionGuard {
    store: Arc<dyn KeyValueStore>,
    timeout: Duration,
}

impl SessionGuard {
    pub fn new(store: Arc<dyn KeyValueStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub async fn read(&self, key: &str) -> FlagRead {
        match bounded(self.timeout, self.store.get(key)).await {
            Ok(None) => FlagRead::Missing,
            Ok(Some(value)) => FlagRead::Value(value),
            Err(e) => FlagRead::Unreadable(e),
        }
    }

    /// True only when the admission flag reads exactly "1"
    pub async fn is_admission_open(&self) -> bool {
        let read = self.read(ADMISSION_KEY).await;
        match &read {
            FlagRead::Value(v) => {
                let open = v.trim() == ADMISSION_OPEN;
                if !open {
                    debug!("{} is {:?}, admission closed", ADMISSION_KEY, v);
                }
                open
            }
            FlagRead::Missing => {
                debug!("{} not set, admission closed", ADMISSION_KEY);
                false
            }
            FlagRead::Unreadable(e) => {
                warn!("Cannot read {}: {}, treating admission as closed", ADMISSION_KEY, e);
                read.is_present(UnknownAs::Absent)
            }
        }
    }

    /// True unless the cache positively reports a miss for this identity
    pub async fn is_session_active(&self, identity: &str) -> bool {
        let key = session_key(identity);
        let read = self.read(&key).await;
        match &read {
            FlagRead::Unreadable(e) => {
                warn!("Cannot read {}: {}, treating session as active", key, e);
            }
            FlagRead::Value(v) => debug!("{} present ({:?})", key, v),
            FlagRead::Missing => debug!("{} not set", key),
        }
        read.is_present(UnknownAs::Present)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;

    /// Map-backed cache; keys listed in `broken` return an error
    #[derive(Default)]
    struct MapStore {
        values: HashMap<String, String>,
        broken: Vec<String>,
    }

    #[async_trait]
    impl KeyValueStore for MapStore {
        async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            if self.broken.iter().any(|k| k == key) {
                return Err(StoreError::Unavailable("connection reset".to_string()));
            }
            Ok(self.values.get(key).cloned())
        }
    }

    struct HangingStore;

    #[async_trait]
    impl KeyValueStore for HangingStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Some("1".to_string()))
        }
    }

    fn guard_with(values: &[(&str, &str)], broken: &[&str]) -> SessionGuard {
        let store = MapStore {
            values: values
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            broken: broken.iter().map(|k| k.to_string()).collect(),
        };
        SessionGuard::new(Arc::new(store), Duration::from_secs(5))
    }

    #[test]
    fn test_session_key() {
        assert_eq!(session_key("bob"), "ovpn:bob");
    }

    #[test]
    fn test_flag_policy() {
        let unreadable = FlagRead::Unreadable(StoreError::Unavailable("x".into()));
        assert!(!unreadable.is_present(UnknownAs::Absent));
        assert!(unreadable.is_present(UnknownAs::Present));
        assert!(!FlagRead::Missing.is_present(UnknownAs::Present));
        assert!(FlagRead::Value(String::new()).is_present(UnknownAs::Absent));
    }

    #[tokio::test]
    async fn test_admission_open() {
        assert!(guard_with(&[(ADMISSION_KEY, "1")], &[]).is_admission_open().await);
        assert!(guard_with(&[(ADMISSION_KEY, " 1\n")], &[]).is_admission_open().await);
    }

    #[tokio::test]
    async fn test_admission_closed() {
        assert!(!guard_with(&[], &[]).is_admission_open().await);
        assert!(!guard_with(&[(ADMISSION_KEY, "0")], &[]).is_admission_open().await);
        assert!(!guard_with(&[(ADMISSION_KEY, "true")], &[]).is_admission_open().await);
        assert!(!guard_with(&[], &[ADMISSION_KEY]).is_admission_open().await);
    }

    #[tokio::test]
    async fn test_session_active() {
        assert!(!guard_with(&[], &[]).is_session_active("bob").await);
        assert!(guard_with(&[("ovpn:bob", "1")], &[]).is_session_active("bob").await);
        // An empty stored value still counts as a session
        assert!(guard_with(&[("ovpn:bob", "")], &[]).is_session_active("bob").await);
        assert!(!guard_with(&[("ovpn:alice", "1")], &[]).is_session_active("bob").await);
    }

    #[tokio::test]
    async fn test_unreadable_session_counts_as_active() {
        assert!(guard_with(&[], &["ovpn:bob"]).is_session_active("bob").await);
    }

    #[tokio::test]
    async fn test_non_utf8_values() {
        // What the memcache adapter hands over for a value that is not UTF-8
        let lossy = String::from_utf8_lossy(&[0xff, 0x01]).into_owned();
        assert!(guard_with(&[("ovpn:bob", lossy.as_str())], &[]).is_session_active("bob").await);
        assert!(!guard_with(&[(ADMISSION_KEY, lossy.as_str())], &[]).is_admission_open().await);
    }

    #[tokio::test]
    async fn test_timeouts_follow_policy() {
        let guard = SessionGuard::new(Arc::new(HangingStore), Duration::from_millis(10));
        assert!(!guard.is_admission_open().await);
        assert!(guard.is_session_active("bob").await);
    }
}
