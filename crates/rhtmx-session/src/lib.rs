//! # RHTMX Session - Cookie-bound sessions with pluggable storage
//!
//! This crate issues session identifiers, binds them to HTTP cookies and
//! delegates storage to a provider.
//!
//! ## Features
//!
//! - **Multiple Providers**: Memory, File, Cookie, Redis, MySQL
//! - **Id Regeneration**: Move a session to a fresh id without losing data
//! - **Garbage Collection**: Periodic removal of expired sessions
//! - **Axum Middleware**: Session start/release around every request
//!
//! ## Example
//!
//! ```rust,no_run
//! use rhtmx_session::{Manager, ManagerConfig, ProviderConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ManagerConfig {
//!         cookie_name: "sid".to_string(),
//!         provider: ProviderConfig::Memory,
//!         ..ManagerConfig::default()
//!     };
//!
//!     let manager = Manager::new(config).await.unwrap();
//!     let _gc = manager.spawn_gc();
//!
//!     // Add `rhtmx_session::session_layer` to your router
//! }
//! ```

pub mod config;
pub mod error;
pub mod manager;
pub mod middleware;
pub mod provider;
pub mod session;
pub mod sid;

pub use config::{HashFunc, ManagerConfig, ProviderConfig};
pub use error::{Result, SessionError};
pub use manager::Manager;
pub use middleware::session_layer;
pub use provider::Provider;
pub use session::{Session, SessionRecord};
