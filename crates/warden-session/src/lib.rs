//! Warden Session - Signed Session Tokens
//!
//! A session token is an HS256 JWT holding the user's [`SessionClaims`]:
//! the resolved scopes, email, roles and identity extras. It lives on the
//! client (cookie `jwt` or `Authorization: Bearer`), so the gateway keeps no
//! session state.
//!
//! Verification is split in two steps. [`TokenCodec::verify`] checks the
//! signature and expiry; [`VerifiedToken::claims`] then decodes the private
//! claims. A failure in the first step sends the user back to login, a
//! failure in the second is an internal error.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use warden_session::{SessionClaims, TokenCodec};
//!
//! let codec = TokenCodec::new(secret);
//! let token = codec.mint(&SessionClaims::new(email, scopes), Duration::from_secs(3600))?;
//! let claims = codec.verify(&token)?.claims()?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod claims;
pub mod codec;
pub mod error;

pub use claims::SessionClaims;
pub use codec::{TokenCodec, VerifiedToken};
pub use error::{SessionError, SessionResult};
