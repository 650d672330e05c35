#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

/// Version of the satchel library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod handlers;
pub mod session;
pub mod settings;
pub mod signing;
pub mod store;
pub mod utils;

// Make test utilities available for both unit tests and integration tests
#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Re-export commonly used items
pub use session::{Session, SessionError, SessionExpiry, SessionManager};
pub use settings::SatchelSettings;
pub use signing::Signer;
pub use store::{build_store, SessionStore};
