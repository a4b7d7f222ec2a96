//! A privacy-preserving anonymous token issuance and redemption service.
//!
//! Clients obtain blindly-signed tokens from an issuer (`Issue`) and later
//! redeem them without the issuer learning which issuance they correspond to
//! (`Redeem`), using a verifiable oblivious pseudorandom function (VOPRF)
//! over P-256 and a batched Chaum-Pedersen proof that every signature in an
//! Issue batch was produced honestly under the same key.
//!
//! Module map:
//! - [`group`]: the prime-order group abstraction (P-256) and hash-to-curve.
//! - [`dleq`]: single and batched discrete-log-equality proofs.
//! - [`voprf`]: blind/sign/unblind, key derivation, request-binding MACs.
//! - [`proto`]: Issue/Redeem request handling and wire formats.
//! - [`issuer`]: issuer lifecycle, rotation, and caching.
//! - [`ledger`]: the at-most-once redemption ledger, legacy v1 ledger, and
//!   advisory spent-token filter.
//! - [`worker`]: the async stream-processing pipeline.
//! - [`http`]: the legacy synchronous HTTP surface and metrics endpoint.
//! - [`config`]: process configuration.
//! - [`telemetry`]: logging initialization.
//! - [`error`]: the closed error taxonomies composed by every component above.

pub mod config;
pub mod dleq;
pub mod error;
pub mod group;
pub mod http;
pub mod issuer;
pub mod ledger;
pub mod proto;
pub mod telemetry;
pub mod voprf;
pub mod worker;

pub use error::ServiceError;
