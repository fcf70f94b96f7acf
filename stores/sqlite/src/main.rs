use anyhow::Result;
use shop_common::{ config::ShopConfig, fixtures::seed_catalog, logging::init_tracing, server::run_server };
use shop_sqlite::SqliteStore;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
	init_tracing();
	let config = ShopConfig::from_env()?;

	info!("Opening SQLite store at {}", config.database_path.display());
	let store = SqliteStore::open(&config.database_path).await?;

	let seeded = seed_catalog(&store, config.seed_products).await?;
	if seeded > 0 {
		info!("Added {} demo products", seeded);
	}

	run_server(store, &config).await?;

	Ok(())
}
