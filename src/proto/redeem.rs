//! Redeem request handling (§4.4).

use time::OffsetDateTime;

use super::wire::{b64_decode, h2c_method_from_params, BlindTokenRequest, RequestType};
use crate::error::{LedgerError, TokenError, WorkerError};
use crate::group::Point;
use crate::issuer::Issuer;
use crate::ledger::{self, Equivalence, Ledger, Redemption, SpentTokenFilter};
use crate::voprf::{check_request_binding, derive_key};

/// Successful redemption outcome, mirroring the status codes of §4.7's
/// `Result` shape for redemption records.
#[derive(Debug, PartialEq, Eq)]
pub enum RedeemStatus {
    Ok,
    DuplicateRedemption,
    Unverified,
}

/// Verifies a Redeem request's MAC against every non-expired key of
/// `issuer`, stopping at the first match, and builds the [`Redemption`] the
/// ledger would record — without touching the ledger itself.
///
/// Split out of [`handle_redeem`] so a caller that needs to validate a
/// whole batch before committing any of it (bulk redemption, §6) can gather
/// every [`Redemption`] first and hand them to the ledger as one atomic
/// unit via [`ledger::redeem_all`].
pub fn verify_redeem(
    request: &BlindTokenRequest,
    issuer: &Issuer,
    host: &str,
    path: &str,
    now: OffsetDateTime,
    offset: u64,
) -> Result<Redemption, WorkerError> {
    if request.request_type != RequestType::Redeem {
        return Err(TokenError::UnexpectedRequestType.into());
    }
    if request.contents.len() < 2 {
        return Err(TokenError::InvalidFormat.into());
    }

    let preimage = b64_decode(&request.contents[0])?;
    let mac_bytes = b64_decode(&request.contents[1])?;
    let mac: [u8; 32] = mac_bytes.try_into().map_err(|_| TokenError::InvalidFormat)?;
    let method = h2c_method_from_params(request.contents.get(2))?;

    let t = Point::hash_to_curve(&preimage, method).map_err(TokenError::InvalidCurvePoint)?;

    let matched_key = issuer
        .active_keys(now)
        .into_iter()
        .find_map(|(x, _commitment)| {
            let n = t.scalar_mul(&x);
            let k = derive_key(&n, &preimage);
            check_request_binding(&k, &mac, &[host.as_bytes(), path.as_bytes()]).then_some(())
        });

    if matched_key.is_none() {
        return Err(TokenError::InvalidMac.into());
    }

    Ok(Redemption::new(
        issuer.id(),
        preimage,
        mac_bytes_as_payload(host, path),
        issuer.expires_at(),
        offset,
    ))
}

/// Validates a Redeem request against every non-expired key of `issuer`,
/// stopping at the first MAC match, then consults the ledger.
///
/// Per the design note on the legacy duplicate branch (§9): a
/// `DuplicateRedemption` outcome is terminal for this call — callers must
/// not attempt any further processing of the same message.
pub async fn handle_redeem(
    request: &BlindTokenRequest,
    issuer: &Issuer,
    ledger_store: &dyn Ledger,
    host: &str,
    path: &str,
    now: OffsetDateTime,
    offset: u64,
    tolerable_equivalence: &[Equivalence],
    filter: Option<&SpentTokenFilter>,
) -> Result<RedeemStatus, WorkerError> {
    let redemption = verify_redeem(request, issuer, host, path, now, offset)?;

    match ledger::redeem(ledger_store, redemption, tolerable_equivalence, filter).await {
        Ok(()) => Ok(RedeemStatus::Ok),
        Err(LedgerError::DuplicateRedemption(_)) => Ok(RedeemStatus::DuplicateRedemption),
        Err(err @ LedgerError::TransientStorage(_)) => Err(err.into()),
    }
}

fn mac_bytes_as_payload(host: &str, path: &str) -> Vec<u8> {
    let mut payload = host.as_bytes().to_vec();
    payload.push(0);
    payload.extend_from_slice(path.as_bytes());
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::Scalar;
    use crate::issuer::{IssuerRecordV1, PublicCommitment};
    use crate::ledger::InMemoryLedger;
    use crate::proto::wire::b64_encode;

    fn sample_issuer() -> (Issuer, Scalar) {
        let x = Scalar::random();
        let g = Point::generator().scalar_mul(&Scalar::random());
        let h = g.scalar_mul(&x);
        let issuer = Issuer::V1(IssuerRecordV1 {
            id: uuid::Uuid::new_v4(),
            issuer_type: "captcha".into(),
            cohort: 0,
            signing_key: x,
            commitment: PublicCommitment { g, h },
            max_tokens: 100,
            created_at: OffsetDateTime::now_utc(),
            expires_at: None,
            rotated_at: None,
        });
        (issuer, x)
    }

    fn redeem_request_for(preimage: &[u8], x: &Scalar, host: &str, path: &str) -> BlindTokenRequest {
        // No h2c_params element: exercises the Redeem default (increment).
        let t = Point::hash_to_curve(preimage, crate::group::HashToCurveMethod::Increment).unwrap();
        let n = t.scalar_mul(x);
        let k = derive_key(&n, preimage);
        let mac = crate::voprf::create_request_binding(&k, &[host.as_bytes(), path.as_bytes()]);
        BlindTokenRequest {
            request_type: RequestType::Redeem,
            contents: vec![b64_encode(preimage), b64_encode(&mac)],
        }
    }

    #[tokio::test]
    async fn token_redeems_once_then_reports_duplicate() {
        let (issuer, x) = sample_issuer();
        let ledger = InMemoryLedger::new();
        let request = redeem_request_for(b"unique-preimage-bytes", &x, "example.com", "/index.html");

        let first = handle_redeem(
            &request,
            &issuer,
            &ledger,
            "example.com",
            "/index.html",
            OffsetDateTime::now_utc(),
            0,
            &[],
            None,
        )
        .await
        .unwrap();
        assert_eq!(first, RedeemStatus::Ok);

        let second = handle_redeem(
            &request,
            &issuer,
            &ledger,
            "example.com",
            "/index.html",
            OffsetDateTime::now_utc(),
            1,
            &[],
            None,
        )
        .await
        .unwrap();
        assert_eq!(second, RedeemStatus::DuplicateRedemption);
    }

    #[tokio::test]
    async fn mac_mismatch_on_wrong_host_is_rejected() {
        let (issuer, x) = sample_issuer();
        let ledger = InMemoryLedger::new();
        let request = redeem_request_for(b"another-preimage-bytes", &x, "example.com", "/index.html");

        let result = handle_redeem(
            &request,
            &issuer,
            &ledger,
            "other.com",
            "/index.html",
            OffsetDateTime::now_utc(),
            0,
            &[],
            None,
        )
        .await;
        assert!(matches!(result, Err(WorkerError::Token(TokenError::InvalidMac))));
        assert!(ledger.get(ledger::redemption_id(issuer.id(), b"another-preimage-bytes")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn wrong_signing_key_is_rejected() {
        let (issuer, _x) = sample_issuer();
        let other_key = Scalar::random();
        let ledger = InMemoryLedger::new();
        let request = redeem_request_for(b"third-preimage-bytes", &other_key, "example.com", "/index.html");

        let result = handle_redeem(
            &request,
            &issuer,
            &ledger,
            "example.com",
            "/index.html",
            OffsetDateTime::now_utc(),
            0,
            &[],
            None,
        )
        .await;
        assert!(matches!(result, Err(WorkerError::Token(TokenError::InvalidMac))));
    }

    #[tokio::test]
    async fn explicit_swu_h2c_params_is_honored() {
        let (issuer, x) = sample_issuer();
        let ledger = InMemoryLedger::new();
        let preimage = b"swu-preimage-bytes";
        let t = Point::hash_to_curve(preimage, crate::group::HashToCurveMethod::Swu).unwrap();
        let n = t.scalar_mul(&x);
        let k = derive_key(&n, preimage);
        let mac = crate::voprf::create_request_binding(&k, &[b"example.com", b"/index.html"]);
        let h2c_params = crate::proto::wire::b64_encode(br#"{"method":"swu"}"#);
        let request = BlindTokenRequest {
            request_type: RequestType::Redeem,
            contents: vec![
                crate::proto::wire::b64_encode(preimage),
                crate::proto::wire::b64_encode(&mac),
                h2c_params,
            ],
        };

        let result = handle_redeem(
            &request,
            &issuer,
            &ledger,
            "example.com",
            "/index.html",
            OffsetDateTime::now_utc(),
            0,
            &[],
            None,
        )
        .await
        .unwrap();
        assert_eq!(result, RedeemStatus::Ok);
    }
}
