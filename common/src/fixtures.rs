use rand::Rng;
use rust_decimal::Decimal;
use tracing::info;

use crate::error::ShopResult;
use crate::models::ProductDraft;
use crate::store::ShopStore;

const ADJECTIVES: &[&str] = &["Classic", "Compact", "Deluxe", "Everyday", "Rustic", "Smart"];
const NOUNS: &[&str] = &["Backpack", "Desk Lamp", "Kettle", "Notebook", "Mug", "Headphones"];

/// Random credentials, for tests and demo data
pub fn generate_random_credentials() -> (String, String) {
	let mut rng = rand::thread_rng();

	(
		format!("user{}", rng.gen_range(1000..9999)),
		format!("pw{}", rng.gen_range(100_000..999_999)),
	)
}

pub fn generate_random_product() -> ProductDraft {
	let mut rng = rand::thread_rng();

	ProductDraft {
		name: format!(
			"{} {} {}",
			ADJECTIVES[rng.gen_range(0..ADJECTIVES.len())],
			NOUNS[rng.gen_range(0..NOUNS.len())],
			rng.gen_range(100..999)
		),
		price: Decimal::new(rng.gen_range(100..10000), 2),
	}
}

/// Fill an empty catalog with `count` random products. A catalog that
/// already has products is left alone.
pub async fn seed_catalog<S: ShopStore + ?Sized>(store: &S, count: usize) -> ShopResult<usize> {
	if count == 0 || !store.list_products().await?.is_empty() {
		return Ok(0);
	}

	for _ in 0..count {
		store.add_product(&generate_random_product()).await?;
	}
	info!(count, database = %store.database_name(), "seeded catalog");
	Ok(count)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn random_product_has_valid_price() {
		for _ in 0..50 {
			let product = generate_random_product();
			assert!(!product.name.is_empty());
			assert!(product.price >= Decimal::new(100, 2));
			assert!(product.price < Decimal::new(100, 0));
			assert_eq!(product.price.scale(), 2);
		}
	}
}
