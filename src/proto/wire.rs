//! JSON wire types for the token protocol (§6).

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::dleq::BatchDleqProof;
use crate::error::TokenError;
use crate::group::HashToCurveMethod;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestType {
    #[serde(rename = "Issue")]
    Issue,
    #[serde(rename = "Redeem")]
    Redeem,
}

/// `BlindTokenRequest = { "type": "Issue"|"Redeem", "contents": [<b64>, …] }`.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct BlindTokenRequest {
    #[serde(rename = "type")]
    pub request_type: RequestType,
    pub contents: Vec<String>,
}

/// `BlindTokenRequestWrapper = { "bl_sig_req": <b64 of BlindTokenRequest>, "host": string?, "http": string? }`.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct BlindTokenRequestWrapper {
    pub bl_sig_req: String,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub http: Option<String>,
}

impl BlindTokenRequestWrapper {
    pub fn decode_inner(&self) -> Result<BlindTokenRequest, TokenError> {
        let raw = B64
            .decode(self.bl_sig_req.as_bytes())
            .map_err(|_| TokenError::InvalidFormat)?;
        serde_json::from_slice(&raw).map_err(|_| TokenError::InvalidFormat)
    }
}

/// `IssueResponse = { "sigs": [<b64>, …], "proof": "batch-proof=" + <json of {P:<b64>}>, "version": string }`.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct IssueResponse {
    pub sigs: Vec<String>,
    pub proof: String,
    pub version: String,
}

impl IssueResponse {
    pub fn new(sigs: &[Vec<u8>], proof: &BatchDleqProof, version: impl Into<String>) -> Self {
        IssueResponse {
            sigs: sigs.iter().map(|s| B64.encode(s)).collect(),
            proof: proof.marshal(),
            version: version.into(),
        }
    }
}

pub fn b64_decode(s: &str) -> Result<Vec<u8>, TokenError> {
    B64.decode(s.as_bytes()).map_err(|_| TokenError::InvalidFormat)
}

pub fn b64_encode(bytes: &[u8]) -> String {
    B64.encode(bytes)
}

/// Optional third `contents` element of a Redeem request (§4.4): selects a
/// non-default hash-to-curve method for the `t` preimage. Absent entirely
/// when the client wants the Redeem default.
#[derive(Serialize, Deserialize, Clone, Debug)]
struct H2cParams {
    method: H2cMethodName,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug)]
#[serde(rename_all = "lowercase")]
enum H2cMethodName {
    Increment,
    Swu,
}

impl From<H2cMethodName> for HashToCurveMethod {
    fn from(name: H2cMethodName) -> Self {
        match name {
            H2cMethodName::Increment => HashToCurveMethod::Increment,
            H2cMethodName::Swu => HashToCurveMethod::Swu,
        }
    }
}

/// Decodes a Redeem request's optional `h2c_params` element. Per §4.4, the
/// Redeem default in the *absence* of this element is increment, not the
/// group's own general-purpose default (Swu).
pub fn h2c_method_from_params(raw: Option<&String>) -> Result<HashToCurveMethod, TokenError> {
    let Some(encoded) = raw else {
        return Ok(HashToCurveMethod::Increment);
    };
    let json = b64_decode(encoded)?;
    let params: H2cParams = serde_json::from_slice(&json).map_err(|_| TokenError::InvalidFormat)?;
    Ok(params.method.into())
}
