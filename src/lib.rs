//! OVPN Updown - OpenVPN connect/disconnect hook
//!
//! On each client connect or disconnect, this crate decides whether the
//! session is admissible, records it through the session ledger, and grants
//! or revokes the client's access to its networks by updating pf tables.
//!
//! # Architecture
//!
//! - `config`: Configuration file handling (TOML)
//! - `openvpn`: OpenVPN hook integration
//! - `session`: Admission, entitlement, ledger and the connect/disconnect flow
//! - `store`: MySQL and memcached adapters
//! - `firewall`: pf table synchronization
//!
//! # Usage
//!
//! As an OpenVPN client-connect/client-disconnect script:
//! ```text
//! client-connect "/usr/local/bin/ovpn-updown --config /etc/openvpn/updown.toml hook"
//! client-disconnect "/usr/local/bin/ovpn-updown --config /etc/openvpn/updown.toml hook"
//! ```

pub mod config;
pub mod firewall;
pub mod openvpn;
pub mod session;
pub mod store;

pub use config::Config;
pub use openvpn::handle_hook_mode;
pub use session::Orchestrator;
