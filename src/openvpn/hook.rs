//! OpenVPN hook mode handler
//!
//! When invoked as a hook, we:
//!
//! 1. Parse environment variables from OpenVPN
//! 2. Open the database pool; the cache connects on first read
//! 3. On connect: admission check → login record → grant networks
//! 4. On disconnect: logout record → revoke networks
//!
//! # Error Handling
//!
//! Errors are logged and returned; `main` turns them into exit code 1.
//! Firewall failures are warnings and never fail the hook.

use crate::config::Config;
use crate::firewall::{FirewallSynchronizer, Pfctl};
use crate::openvpn::env::{Event, HookEnv};
use crate::session::{
    EntitlementResolver, EventOutcome, Orchestrator, SessionError, SessionGuard, SessionLedger,
};
use crate::store::{MemcacheStore, MysqlStore, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum HookError {
    #[error("Environment parsing failed: {0}")]
    EnvError(#[from] crate::openvpn::env::EnvError),
    #[error("Store error: {0}")]
    StoreError(#[from] StoreError),
    #[error("Session error: {0}")]
    SessionError(#[from] SessionError),
}

/// Main entry point for hook mode
///
/// Called when `ovpn-updown hook` is run by OpenVPN.
pub async fn handle_hook_mode(config: &Config) -> Result<EventOutcome, HookError> {
    let env = HookEnv::from_env()?;

    info!(
        "Hook mode: event={}, client={}, local={}, remote={}",
        env.event, env.identity, env.local_ip, env.peer_ip
    );

    let mysql = Arc::new(MysqlStore::new(&config.mysql)?);
    let orchestrator = build_orchestrator(config, mysql.clone());

    let result = dispatch(&orchestrator, &env).await;

    if let Err(e) = mysql.close().await {
        warn!("Failed to close database pool: {}", e);
    }

    let outcome = result?;
    for failed in outcome.firewall.failures() {
        if let Err(e) = &failed.result {
            warn!("Network {} left out of sync: {}", failed.codename, e);
        }
    }
    Ok(outcome)
}

/// Run the transition matching the event
pub async fn dispatch(orchestrator: &Orchestrator, env: &HookEnv) -> Result<EventOutcome, SessionError> {
    match env.event {
        Event::Connect => {
            orchestrator
                .client_connect(&env.identity, env.local_ip, env.peer_ip)
                .await
        }
        Event::Disconnect => {
            orchestrator
                .client_disconnect(&env.identity, env.local_ip, env.peer_ip)
                .await
        }
    }
}

fn build_orchestrator(config: &Config, mysql: Arc<MysqlStore>) -> Orchestrator {
    let timeout = config.store_timeout();
    let cache = Arc::new(MemcacheStore::new(config.memcache.url(timeout)));
    let pfctl = Arc::new(Pfctl::new(&config.pfctl.path));

    Orchestrator::new(
        SessionGuard::new(cache, timeout),
        SessionLedger::new(mysql.clone(), timeout),
        EntitlementResolver::new(mysql, timeout),
        FirewallSynchronizer::new(config.pfctl.enable, config.pfctl.suffix.clone(), pfctl),
    )
}
