pub mod auth;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod logwriter;
pub mod models;
pub mod pool;
pub mod rollup;
pub mod stream;
pub mod validate;

pub use config::{ConfigLoader, ConfigSnapshot};
pub use context::{RequestContext, UsageAccumulator};
pub use error::ApiError;
pub use handler::AppState;
pub use logwriter::LogWriter;
pub use pool::{KeyPool, PooledCredential, Selection};
pub use rollup::RollupWorker;
