pub mod config;
pub mod daemon;
pub mod error;

pub use config::{RefreshConfig, RefresherConfig};
pub use daemon::Daemon;
pub use error::RefresherError;
