//! Cookie/CSRF HTTP session, retries, and request framing.

pub mod auth;
pub mod session;

pub use auth::HttpSession;
