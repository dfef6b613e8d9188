//! OpenVPN environment variable parsing
//!
//! OpenVPN runs `client-connect` and `client-disconnect` scripts with the
//! connection details in the environment.
//!
//! # Key Variables
//!
//! | Variable | Example | Description |
//! |----------|---------|-------------|
//! | `script_type` | `client-connect` | Lifecycle event |
//! | `common_name` | `bob` | Client certificate CN |
//! | `ifconfig_pool_remote_ip` | `10.8.0.12` | Address assigned inside the tunnel |
//! | `untrusted_ip` | `203.0.113.7` | Client's real source address |

use std::env;
use std::net::Ipv4Addr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EnvError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid IP address in {var}: {value}")]
    InvalidIp { var: String, value: String },
    #[error("Unknown script_type: {0}")]
    UnknownEvent(String),
    #[error("Empty common_name")]
    EmptyIdentity,
}

/// The lifecycle event OpenVPN is running us for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Connect,
    Disconnect,
}

impl std::str::FromStr for Event {
    type Err = EnvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client-connect" => Ok(Event::Connect),
            "client-disconnect" => Ok(Event::Disconnect),
            _ => Err(EnvError::UnknownEvent(s.to_string())),
        }
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Event::Connect => f.write_str("client-connect"),
            Event::Disconnect => f.write_str("client-disconnect"),
        }
    }
}

/// Parsed OpenVPN hook environment
#[derive(Debug, Clone)]
pub struct HookEnv {
    pub event: Event,
    /// Certificate common name
    pub identity: String,
    /// Tunnel-local address (`ifconfig_pool_remote_ip`)
    pub local_ip: Ipv4Addr,
    /// Real-world source address (`untrusted_ip`)
    pub peer_ip: Ipv4Addr,
}

impl HookEnv {
    /// Parse the hook environment from the current process
    pub fn from_env() -> Result<Self, EnvError> {
        Self::from_env_fn(|key| env::var(key))
    }

    /// Parse environment using a custom getter (for testing)
    pub fn from_env_fn<F>(get_var: F) -> Result<Self, EnvError>
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        let event: Event = required(&get_var, "script_type")?.parse()?;

        let identity = required(&get_var, "common_name")?;
        if identity.trim().is_empty() {
            return Err(EnvError::EmptyIdentity);
        }

        let local_ip = parse_ipv4(&get_var, "ifconfig_pool_remote_ip")?;
        let peer_ip = parse_ipv4(&get_var, "untrusted_ip")?;

        Ok(Self {
            event,
            identity,
            local_ip,
            peer_ip,
        })
    }
}

fn required<F>(get_var: &F, var: &str) -> Result<String, EnvError>
where
    F: Fn(&str) -> Result<String, env::VarError>,
{
    get_var(var).map_err(|_| EnvError::MissingVar(var.to_string()))
}

fn parse_ipv4<F>(get_var: &F, var: &str) -> Result<Ipv4Addr, EnvError>
where
    F: Fn(&str) -> Result<String, env::VarError>,
{
    let value = required(get_var, var)?;
    value.trim().parse().map_err(|_| EnvError::InvalidIp {
        var: var.to_string(),
        value,
    })
}
