//! `agencyhub-auth`: authentication and authorization boundary.
//!
//! This crate is intentionally decoupled from HTTP and storage: it validates
//! tokens, resolves permissions from roles, memoises per-request lookups and
//! provides the two-factor and field-encryption primitives used for account
//! security.

pub mod auth_cache;
pub mod authorize;
pub mod claims;
pub mod encryption;
pub mod jwt;
pub mod permissions;
pub mod policy;
pub mod principal;
pub mod roles;
pub mod two_factor;

pub use auth_cache::AuthCache;
pub use authorize::{authorize, AuthzError, CommandAuthorization, Principal};
pub use claims::{validate_claims, JwtClaims, TokenValidationError};
pub use encryption::{CryptoError, FieldCipher};
pub use jwt::{Hs256JwtValidator, JwtValidator, TokenError};
pub use permissions::Permission;
pub use policy::{effective_permissions, role_permissions};
pub use principal::AgencyMembership;
pub use roles::Role;
pub use two_factor::TotpError;
