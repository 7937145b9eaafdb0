pub mod db;
pub mod entities;
pub mod stores;

pub use stores::{
    ConfigStore, CredentialRow, CredentialStore, LogRecord, LogStore, RollupAggregate, RollupKey,
    RollupStore, SeaOrmConfigStore, SeaOrmCredentialStore, SeaOrmLogStore, SeaOrmRollupStore,
    StorageError, StorageResult,
};
