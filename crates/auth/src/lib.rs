//! `datastory-auth`: authentication boundary.
//!
//! Two callers reach the orchestration core: end users (bearer JWT) and the
//! analysis worker (HMAC-signed callbacks). This crate is decoupled from HTTP
//! and storage.

pub mod claims;
pub mod jwt;
pub mod signature;

pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use jwt::{Hs256JwtValidator, JwtError, JwtValidator};
pub use signature::{CallbackSigner, SignatureError, SIGNATURE_HEADER};
