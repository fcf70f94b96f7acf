pub mod config;
pub mod error;
pub mod fixtures;
pub mod logging;
pub mod models;
pub mod notifier;
pub mod server;
pub mod session;
pub mod shop;
pub mod store;
pub mod validation;

pub use error::{ ShopError, ShopResult };
pub use shop::Shop;
pub use store::ShopStore;
