pub mod config;
mod db;
pub mod dialect;
pub mod labels;
pub mod migration;
pub mod store;

pub use sieve_core::*;

pub use config::{
    ClusterConfig, DEFAULT_SQLITE_NAME, DatabaseConfig, PoolConfig, SieveConfig, TablesConfig,
};
pub use dialect::Dialect;
pub use labels::SelectorCompiler;
pub use store::ArchiveStore;
