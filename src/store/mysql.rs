//! MySQL identity store and session ledger

use super::{EntitlementRow, IdentityStore, LedgerStore, Procedure, StoreError};
use crate::config::MysqlConfig;
use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{Opts, OptsBuilder, Pool, PoolConstraints, PoolOpts, Row};
use tracing::debug;

/// Active networks that are public or granted to the player, plus the targets
/// the player owns an instance of. The second column tells the branches apart.
const ENTITLEMENT_QUERY: &str = "\
SELECT codename, 0 AS owned FROM network \
WHERE (codename IS NOT NULL AND active=1) \
AND (public=1 OR id IN (SELECT network_id FROM network_player WHERE player_id=?)) \
UNION \
SELECT t2.name, 1 AS owned FROM target_instance AS t1 \
LEFT JOIN target AS t2 ON t1.target_id=t2.id \
WHERE t1.player_id=?";

pub struct MysqlStore {
    pool: Pool,
}

impl MysqlStore {
    /// Build a lazily-connecting pool capped at one connection
    pub fn new(config: &MysqlConfig) -> Result<Self, StoreError> {
        Ok(Self {
            pool: Pool::new(connect_opts(config)?),
        })
    }

    /// Close the pool; call once the event has been handled
    pub async fn close(&self) -> Result<(), StoreError> {
        self.pool
            .clone()
            .disconnect()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }

    async fn conn(&self) -> Result<mysql_async::Conn, StoreError> {
        self.pool
            .get_conn()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

fn connect_opts(config: &MysqlConfig) -> Result<Opts, StoreError> {
    let server = Opts::from_url(&config.server_url())
        .map_err(|e| StoreError::Unavailable(e.to_string()))?;
    let constraints = PoolConstraints::new(0, 1)
        .ok_or_else(|| StoreError::Unavailable("invalid pool constraints".to_string()))?;

    let opts = OptsBuilder::from_opts(server)
        .user(Some(config.username.as_str()))
        .pass((!config.password.is_empty()).then_some(config.password.as_str()))
        .db_name(Some(config.database.as_str()))
        .pool_opts(PoolOpts::default().with_constraints(constraints));
    Ok(opts.into())
}

/// Server errors mean the query reached MySQL; everything else is connectivity
fn classify(err: mysql_async::Error) -> StoreError {
    match err {
        mysql_async::Error::Server(e) => StoreError::Query(e.to_string()),
        other => StoreError::Unavailable(other.to_string()),
    }
}

fn decode_row(row: Row) -> Result<EntitlementRow, StoreError> {
    let (name, owned): (Option<String>, i64) =
        mysql_async::from_row_opt(row).map_err(|e| StoreError::Query(e.to_string()))?;

    match owned {
        0 => Ok(EntitlementRow::Network(name)),
        1 => Ok(EntitlementRow::OwnedTarget(name)),
        other => Err(StoreError::Query(format!("unexpected row kind {}", other))),
    }
}

#[async_trait]
impl IdentityStore for MysqlStore {
    async fn entitlement_rows(&self, identity: &str) -> Result<Vec<EntitlementRow>, StoreError> {
        let mut conn = self.conn().await?;
        let rows: Vec<Row> = conn
            .exec(ENTITLEMENT_QUERY, (identity, identity))
            .await
            .map_err(classify)?;

        debug!("Entitlement query returned {} rows for {}", rows.len(), identity);
        rows.into_iter().map(decode_row).collect()
    }
}

#[async_trait]
impl LedgerStore for MysqlStore {
    async fn call(
        &self,
        procedure: Procedure,
        identity: &str,
        local_addr: &str,
        peer_addr: &str,
    ) -> Result<(), StoreError> {
        let mut conn = self.conn().await?;
        let stmt = format!("CALL {}(?,INET_ATON(?),INET_ATON(?))", procedure.name());

        conn.exec_drop(stmt, (identity, local_addr, peer_addr))
            .await
            .map_err(|e| match e {
                mysql_async::Error::Server(e) => StoreError::Procedure {
                    name: procedure.name(),
                    message: e.to_string(),
                },
                other => StoreError::Unavailable(other.to_string()),
            })
    }
}
