//! Authentication: bearer JWT verification and Google OAuth tokens
//!
//! Provides:
//! - JWT decoding/validation (`jwt` submodule)
//! - `require_auth` middleware and the `AuthUser` extractor
//! - Google access-token refresh (`google` submodule)

pub mod extractor;
pub mod google;
pub mod jwt;
pub mod middleware;
