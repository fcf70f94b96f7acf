//! Shop configuration loaded from environment variables (and `.env`).
//!
//! - `SHOP_DATABASE_PATH` - SQLite database file (default: ./data/shop.db)
//! - `SHOP_HOST` - Bind address (default: 0.0.0.0)
//! - `SHOP_PORT` - Listen port (default: 3001)
//! - `SHOP_POLL_INTERVAL_SECS` - Update check interval (default: 5)
//! - `SHOP_NOTIFICATION_TTL_SECS` - How long a notification stays visible (default: 5)
//! - `SHOP_SESSION_IDLE_SECS` - Idle time before a session is closed (default: 1800)
//! - `SHOP_SEED_PRODUCTS` - Random products to add to an empty catalog (default: 0)

use std::net::{ IpAddr, Ipv4Addr, SocketAddr };
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("Invalid environment variable {0}: {1}")]
	InvalidEnvVar(String, String),
}

#[derive(Debug, Clone)]
pub struct ShopConfig {
	pub database_path: PathBuf,
	pub host: IpAddr,
	pub port: u16,
	pub poll_interval: Duration,
	pub notification_ttl: Duration,
	pub session_idle: Duration,
	pub seed_products: usize,
}

impl Default for ShopConfig {
	fn default() -> Self {
		Self {
			database_path: PathBuf::from("./data/shop.db"),
			host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
			port: 3001,
			poll_interval: Duration::from_secs(5),
			notification_ttl: Duration::from_secs(5),
			session_idle: Duration::from_secs(1800),
			seed_products: 0,
		}
	}
}

impl ShopConfig {
	/// Load `.env` if present, then read the process environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		dotenvy::dotenv().ok();
		Self::from_lookup(|key| std::env::var(key).ok())
	}

	/// Build a config from any key lookup; unset keys keep their defaults.
	pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
		where F: Fn(&str) -> Option<String>
	{
		let defaults = Self::default();

		let poll_secs = positive_secs("SHOP_POLL_INTERVAL_SECS", &lookup, 5)?;
		let idle_secs = positive_secs("SHOP_SESSION_IDLE_SECS", &lookup, 1800)?;

		Ok(Self {
			database_path: lookup("SHOP_DATABASE_PATH")
				.filter(|path| !path.trim().is_empty())
				.map(PathBuf::from)
				.unwrap_or(defaults.database_path),
			host: parse_or("SHOP_HOST", &lookup, defaults.host)?,
			port: parse_or("SHOP_PORT", &lookup, defaults.port)?,
			poll_interval: Duration::from_secs(poll_secs),
			notification_ttl: Duration::from_secs(
				parse_or("SHOP_NOTIFICATION_TTL_SECS", &lookup, 5)?
			),
			session_idle: Duration::from_secs(idle_secs),
			seed_products: parse_or("SHOP_SEED_PRODUCTS", &lookup, defaults.seed_products)?,
		})
	}

	pub fn bind_address(&self) -> SocketAddr {
		SocketAddr::new(self.host, self.port)
	}
}

fn parse_or<T, F>(key: &str, lookup: &F, default: T) -> Result<T, ConfigError>
	where T: FromStr, T::Err: std::fmt::Display, F: Fn(&str) -> Option<String>
{
	match lookup(key) {
		Some(raw) if !raw.trim().is_empty() =>
			raw
				.trim()
				.parse()
				.map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
		_ => Ok(default),
	}
}

fn positive_secs<F>(key: &str, lookup: &F, default: u64) -> Result<u64, ConfigError>
	where F: Fn(&str) -> Option<String>
{
	let secs: u64 = parse_or(key, lookup, default)?;
	if secs == 0 {
		return Err(ConfigError::InvalidEnvVar(key.to_string(), "must be at least 1".to_string()));
	}
	Ok(secs)
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::HashMap;

	fn config_from(pairs: &[(&str, &str)]) -> Result<ShopConfig, ConfigError> {
		let vars: HashMap<String, String> = pairs
			.iter()
			.map(|(k, v)| (k.to_string(), v.to_string()))
			.collect();
		ShopConfig::from_lookup(|key| vars.get(key).cloned())
	}

	#[test]
	fn defaults_when_unset() {
		let config = config_from(&[]).unwrap();
		assert_eq!(config.database_path, PathBuf::from("./data/shop.db"));
		assert_eq!(config.bind_address().to_string(), "0.0.0.0:3001");
		assert_eq!(config.poll_interval, Duration::from_secs(5));
		assert_eq!(config.notification_ttl, Duration::from_secs(5));
		assert_eq!(config.session_idle, Duration::from_secs(1800));
		assert_eq!(config.seed_products, 0);
	}

	#[test]
	fn reads_overrides() {
		let config = config_from(
			&[
				("SHOP_DATABASE_PATH", "/tmp/shop.db"),
				("SHOP_HOST", "127.0.0.1"),
				("SHOP_PORT", "8080"),
				("SHOP_POLL_INTERVAL_SECS", "2"),
				("SHOP_NOTIFICATION_TTL_SECS", "10"),
				("SHOP_SESSION_IDLE_SECS", "600"),
				("SHOP_SEED_PRODUCTS", "25"),
			]
		).unwrap();

		assert_eq!(config.database_path, PathBuf::from("/tmp/shop.db"));
		assert_eq!(config.bind_address().to_string(), "127.0.0.1:8080");
		assert_eq!(config.poll_interval, Duration::from_secs(2));
		assert_eq!(config.notification_ttl, Duration::from_secs(10));
		assert_eq!(config.session_idle, Duration::from_secs(600));
		assert_eq!(config.seed_products, 25);
	}

	#[test]
	fn rejects_bad_values() {
		assert!(matches!(
			config_from(&[("SHOP_PORT", "eighty")]),
			Err(ConfigError::InvalidEnvVar(key, _)) if key == "SHOP_PORT"
		));
		assert!(config_from(&[("SHOP_POLL_INTERVAL_SECS", "0")]).is_err());
		assert!(config_from(&[("SHOP_SESSION_IDLE_SECS", "0")]).is_err());
	}
}
