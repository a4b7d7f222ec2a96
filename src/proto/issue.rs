//! Issue request handling (§4.4).

use time::OffsetDateTime;

use super::wire::{b64_decode, BlindTokenRequest, IssueResponse, RequestType};
use crate::dleq::BatchDleqProof;
use crate::error::TokenError;
use crate::group::Point;
use crate::issuer::{Issuer, PublicCommitment};
use crate::voprf::sign_point;

/// The key version string emitted in [`IssueResponse::version`].
const KEY_VERSION: &str = "2";

/// Validates and signs a batch of blinded points against the issuer's
/// current signing key, producing a self-checked batch DLEQ proof.
pub fn handle_issue(
    request: &BlindTokenRequest,
    issuer: &Issuer,
    now: OffsetDateTime,
) -> Result<IssueResponse, TokenError> {
    if request.request_type != RequestType::Issue {
        return Err(TokenError::UnexpectedRequestType);
    }
    if request.contents.len() > issuer.max_tokens() {
        return Err(TokenError::TooManyTokens);
    }

    let (x, PublicCommitment { g, h }) = issuer
        .current_signing_key(now)
        .ok_or(TokenError::InvalidIssuer)?;

    let ps: Vec<Point> = request
        .contents
        .iter()
        .map(|b64| {
            let bytes = b64_decode(b64)?;
            Point::decode(&bytes).map_err(TokenError::InvalidCurvePoint)
        })
        .collect::<Result<_, TokenError>>()?;

    let qs: Vec<Point> = ps.iter().map(|p| sign_point(p, &x)).collect();

    let proof = BatchDleqProof::prove(g, h, &ps, &qs, &x)
        .map_err(|_| TokenError::InvalidBatchProof)?;

    // Self-check before emitting: an internal bug, never a client input
    // problem, should this fail.
    if !proof.verify(&ps, &qs) {
        return Err(TokenError::InvalidBatchProof);
    }

    let sigs: Vec<Vec<u8>> = qs.iter().map(|q| q.encode_uncompressed()).collect();
    Ok(IssueResponse::new(&sigs, &proof, KEY_VERSION))
}
