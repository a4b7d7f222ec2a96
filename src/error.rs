//! Closed error taxonomies for each component, composed into [`ServiceError`]
//! at the worker/HTTP boundary. No component classifies errors by matching
//! on a message string; every distinction is a variant.

use thiserror::Error;

/// Failures from the group layer: point decoding, hashing to the curve.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum GroupError {
    #[error("point is not on the curve")]
    NotOnCurve,
    #[error("point is the identity")]
    IdentityPoint,
    #[error("malformed point encoding")]
    BadEncoding,
    #[error("hash-to-curve did not converge within the iteration budget")]
    HashToCurveExhausted,
    #[error("scalar is not in the valid range")]
    InvalidScalar,
}

/// Failures verifying a Chaum-Pedersen or batch DLEQ proof.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ProofError {
    #[error("proof failed verification")]
    VerificationFailed,
    #[error("batch proof input lists have mismatched lengths")]
    LengthMismatch,
}

/// Errors arising while validating or executing an Issue/Redeem request.
/// Variant names track the taxonomy in the external interface contract
/// rather than any particular wire representation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("request body is malformed")]
    InvalidFormat,
    #[error("invalid curve point: {0}")]
    InvalidCurvePoint(#[from] GroupError),
    #[error("request contains more tokens than the configured maximum")]
    TooManyTokens,
    #[error("request type does not match the handler invoked")]
    UnexpectedRequestType,
    #[error("request-binding MAC did not verify against any active key")]
    InvalidMac,
    #[error("batch proof failed its own self-check before being emitted")]
    InvalidBatchProof,
    #[error("no active issuer for the requested type/cohort")]
    InvalidIssuer,
}

/// Errors from the redemption ledger.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("redemption already recorded under this id ({0:?})")]
    DuplicateRedemption(crate::ledger::Equivalence),
    #[error("storage layer is unavailable or throttling: {0}")]
    TransientStorage(String),
}

/// Errors surfaced by a worker while processing one message; callers use
/// [`WorkerError::is_temporary`] to decide whether to requeue.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("schema violation: {0}")]
    Schema(String),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl WorkerError {
    /// Temporary errors are requeued with backoff; everything else is
    /// permanent and is emitted as a non-OK result.
    pub fn is_temporary(&self) -> bool {
        matches!(self, WorkerError::Ledger(LedgerError::TransientStorage(_)))
    }
}

/// Configuration failures, fatal at process startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration key `{0}`")]
    MissingKey(&'static str),
    #[error("invalid value for configuration key `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Top-level error composed at the HTTP/worker boundary. Components never
/// construct this directly; they return their own error type and callers
/// use `?`/`From` to lift it here.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Worker(#[from] WorkerError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Group(#[from] GroupError),
    #[error(transparent)]
    Proof(#[from] ProofError),
}
