//! Unified testing utilities for satchel
//!
//! ## Organization
//!
//! - [`fixtures`] - Pre-built settings, signers and session managers
//! - [`mock`] - Store implementations that misbehave on purpose
//!
//! ## Usage
//!
//! ```ignore
//! use satchel::testing::{request_cookie, TestFixtures};
//!
//! async fn round_trip() {
//!     let manager = TestFixtures::session_manager();
//!     let mut session = manager.get_session(None).await.unwrap();
//!     session.insert("username", "JohnDoe").unwrap();
//!     let header = manager.finish(&mut session).await.unwrap().unwrap();
//!     let _next = manager.get_session(Some(&request_cookie(&header))).await.unwrap();
//! }
//! ```

pub mod fixtures;
pub mod mock;

pub use fixtures::{request_cookie, TestFixtures};

/// Common test constants
pub mod constants {
    /// Current signing secret used by fixtures
    pub const TEST_SECRET: &str = "test_secret_32_bytes_long_for_t";

    /// Previous signing secret, still trusted for verification
    pub const TEST_PREVIOUS_SECRET: &str = "previous_test_secret_for_rotate";

    /// Cookie name used by fixtures
    pub const TEST_COOKIE_NAME: &str = "satchel_session";

    /// Default session age used by fixtures (two weeks)
    pub const TEST_DEFAULT_AGE_SECONDS: u64 = 1_209_600;
}
