//! SQLite connection pool and schema.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS subscriptions (
    subscriber_id   TEXT PRIMARY KEY NOT NULL,
    target_price    TEXT NOT NULL,
    delivery_target TEXT NOT NULL,
    active          INTEGER NOT NULL DEFAULT 1,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
)";

/// Open (creating if needed) the database at `database_url` and apply the schema.
///
/// `sqlite::memory:` gets a single long-lived connection, since every new
/// connection to an in-memory database would see an empty database.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);

    let mut pool_options = SqlitePoolOptions::new().max_connections(5);
    if database_url.contains(":memory:") {
        pool_options = pool_options
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
    }

    let pool = pool_options.connect_with(options).await?;
    sqlx::query(SCHEMA).execute(&pool).await?;

    tracing::debug!("Database ready at {}", database_url);
    Ok(pool)
}
