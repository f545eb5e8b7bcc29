pub mod config_store;

use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;

pub use config_store::{ConfigStore, PgConfigStore};

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(25)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .connect(database_url)
        .await
}
