use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::info;

use crate::config::PostgresConfig;

pub mod repositories;

pub async fn build_pg_pool(cfg: &PostgresConfig) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(cfg.max_connections)
        .connect(&cfg.uri)
        .await?;

    if cfg.run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("Database migrations applied");
    }

    Ok(pool)
}
