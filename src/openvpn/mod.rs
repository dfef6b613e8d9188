//! OpenVPN integration module
//!
//! OpenVPN runs our binary as its `client-connect` and `client-disconnect`
//! script, with the client's details in environment variables.
//!
//! # Usage
//!
//! ```text
//! # server.conf
//! script-security 2
//! client-connect "/usr/local/bin/ovpn-updown --config /etc/openvpn/updown.toml hook"
//! client-disconnect "/usr/local/bin/ovpn-updown --config /etc/openvpn/updown.toml hook"
//! ```
//!
//! A non-zero exit on connect makes OpenVPN refuse the client.

pub mod env;
pub mod hook;

pub use env::{Event, HookEnv};
pub use hook::{HookError, dispatch, handle_hook_mode};
