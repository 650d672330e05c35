//! Session Management Module
//!
//! Server-side sessions identified by a random key that travels to the client
//! in a signed cookie.
//!
//! # Modules
//!
//! - [`manager`] - Request/response entry points (`get_session`, `Set-Cookie`)
//! - [`object`] - Request-scoped session with dirty tracking and lifecycle operations
//! - [`expiry`] - Global and per-session expiry rules
//! - [`cookie`] - Cookie construction and parsing
//! - [`key`] - Session key generation and validation
//! - [`errors`] - Error types

pub mod cookie;
pub mod errors;
pub mod expiry;
pub mod key;
pub mod manager;
pub mod object;

// Re-export commonly used items for convenience
pub use cookie::{extract_cookie_value, CookieFactory, CookieOptions};
pub use errors::{SessionError, SignatureError};
pub use expiry::{ExpiryPlan, ExpiryPolicy, SessionExpiry};
pub use key::SessionKey;
pub use manager::{SessionManager, SESSION_SALT};
pub use object::{Session, SessionState};
