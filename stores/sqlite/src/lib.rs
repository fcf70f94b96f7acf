mod sqlite_store;

pub use crate::sqlite_store::SqliteStore;
