//! Schema-driven binary stream message shapes (§6). Encoded with `bincode`,
//! matching the teacher's own choice of a compact binary codec for
//! credential/table payloads.

use serde::{Deserialize, Serialize};

/// One request-set container per message; exactly one data element, more is
/// a schema error.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RequestSet {
    pub request_id: String,
    /// Stream position this message was read from (§3), carried through to
    /// the ledger as `Redemption::offset` for offset-based equivalence
    /// checks across redelivery.
    #[serde(default)]
    pub offset: u64,
    pub data: Vec<RequestRecord>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub enum RequestRecord {
    Sign {
        blinded_tokens: Vec<String>,
        issuer_type: String,
        issuer_cohort: i32,
        associated_data: Vec<u8>,
    },
    Redeem {
        token_preimage: String,
        signature: String,
        binding: String,
        public_key: Option<String>,
        associated_data: Vec<u8>,
    },
}

/// Signing result status codes (§4.7).
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum SignStatus {
    Ok = 0,
    InvalidIssuer = 1,
    Error = 2,
}

/// Redemption result status codes (§4.7).
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum RedeemResultStatus {
    Ok = 0,
    DuplicateRedemption = 1,
    Unverified = 2,
    Error = 3,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub enum ResultRecord {
    Sign {
        signed_tokens: Option<Vec<String>>,
        proof: Option<String>,
        issuer_public_key: Option<String>,
        status: SignStatus,
        associated_data: Vec<u8>,
        /// v2 addition: nullable `valid_from`/`valid_to`, absent from v1
        /// producers. The real deployment's schema registry (Avro or
        /// otherwise) is out of scope here; `Option` plus `serde(default)`
        /// is this crate's stand-in for "v1 consumers tolerate the new
        /// fields".
        #[serde(default)]
        valid_from: Option<String>,
        #[serde(default)]
        valid_to: Option<String>,
    },
    Redeem {
        issuer_name: String,
        issuer_cohort: i32,
        status: RedeemResultStatus,
        associated_data: Vec<u8>,
    },
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ResultSet {
    pub request_id: String,
    pub data: Vec<ResultRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaError(pub String);

impl std::fmt::Display for SchemaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "schema violation: {}", self.0)
    }
}

/// Validates the "exactly one data element" invariant of §4.7.
pub fn validate_request_set(request_set: &RequestSet) -> Result<&RequestRecord, SchemaError> {
    match request_set.data.as_slice() {
        [record] => Ok(record),
        other => Err(SchemaError(format!(
            "expected exactly one data element, got {}",
            other.len()
        ))),
    }
}

pub fn encode_request_set(set: &RequestSet) -> Vec<u8> {
    bincode::serialize(set).expect("RequestSet is always serializable")
}

pub fn decode_request_set(bytes: &[u8]) -> Result<RequestSet, SchemaError> {
    bincode::deserialize(bytes).map_err(|e| SchemaError(e.to_string()))
}

pub fn encode_result_set(set: &ResultSet) -> Vec<u8> {
    bincode::serialize(set).expect("ResultSet is always serializable")
}
