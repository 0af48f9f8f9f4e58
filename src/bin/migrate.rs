use anyhow::Result;
use approval_indexer::config::{Config, StorageBackend};
use approval_indexer::repository::Database;

fn main() -> Result<()> {
    tracing_subscriber::fmt().init();

    let config = Config::from_env()?;
    if config.storage_backend == StorageBackend::Memory {
        println!("STORAGE_BACKEND is memory, nothing to migrate");
        return Ok(());
    }

    println!("Running migrations on database: {}", config.database_url);

    let _db = Database::new(&config.database_url)?;

    println!("Migrations completed successfully!");

    Ok(())
}
