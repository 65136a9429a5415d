//! Postgres pool plumbing for the catalog store.

use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use tracing::info;

use crate::util::env::env_flag;

#[derive(Clone)]
pub struct Db {
    pub pool: PgPool,
}

impl Db {
    /// Connect and, when `AUTO_MIGRATE` is set, apply the bundled
    /// migrations. Production schemas are managed elsewhere, so the gate
    /// defaults to off.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let db = Self::connect_no_migrate(database_url, max_connections).await?;
        if env_flag("AUTO_MIGRATE", false) {
            info!("applying migrations (AUTO_MIGRATE on)");
            sqlx::migrate!("./migrations").run(&db.pool).await?;
        }
        Ok(db)
    }

    /// Connect without ever touching migrations (read-only paths).
    pub async fn connect_no_migrate(database_url: &str, max_connections: u32) -> Result<Self> {
        let mut options = PgConnectOptions::from_str(database_url)?;
        // Transaction-mode poolers (PgBouncer) break on prepared statements;
        // opt back in with USE_PREPARED when connecting directly.
        if !env_flag("USE_PREPARED", false) {
            options = options.statement_cache_capacity(0);
        }
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(600))
            .connect_with(options)
            .await?;
        info!(max_connections, "database pool ready");
        Ok(Self { pool })
    }
}
