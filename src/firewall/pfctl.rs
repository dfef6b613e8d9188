//! pf table control through the `pfctl` utility

use super::{FirewallControl, FirewallError, TableOp};
use async_trait::async_trait;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use tokio::process::Command;

pub struct Pfctl {
    path: PathBuf,
}

impl Pfctl {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl FirewallControl for Pfctl {
    async fn run(&self, table: &str, op: TableOp, address: Ipv4Addr) -> Result<(), FirewallError> {
        let output = Command::new(&self.path)
            .args(["-t", table, "-T", op.as_arg()])
            .arg(address.to_string())
            .output()
            .await
            .map_err(|e| FirewallError::Spawn {
                table: table.to_string(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(FirewallError::Exit {
                table: table.to_string(),
                code: output.status.code(),
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(())
    }
}
