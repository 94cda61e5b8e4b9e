pub mod migrations;
pub mod sqlite;

pub use sqlite::SqlitePool;

/// Opens the pool and brings the schema up to date.
pub fn init(database_url: &str) -> anyhow::Result<SqlitePool> {
    let pool = sqlite::make_pool(database_url)?;
    let mut conn = pool.get()?;
    migrations::run_sqlite_migrations(&mut conn)?;
    Ok(pool)
}
