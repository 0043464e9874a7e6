//! Redis backend for the namespace store
//!
//! # Example
//!
//! ```rust,no_run
//! use kuba_namespace::redis::{RedisConfig, RedisNamespaceStore};
//! use kuba_namespace::store::NamespaceStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = RedisNamespaceStore::new(RedisConfig::default()).await?;
//! let roots = store.get_by_parent("root").await?;
//! println!("{} top-level nodes", roots.len());
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod store;
pub mod util;

pub use connection::{PoolMetrics, RedisConfig, RedisPool, RetryPolicy};
pub use store::{KeySchema, RedisNamespaceStore, DEFAULT_KEY_PREFIX};
