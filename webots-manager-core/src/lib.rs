//! Webots-Manager library exports

pub mod archive;
pub mod catalog;
pub mod config;
pub mod error;
pub mod manager;
pub mod overlay;
pub mod store;
pub mod version;

mod links;

pub use config::ManagerConfig;
pub use error::{ManagerError, Result};
pub use manager::Manager;
pub use version::Version;
