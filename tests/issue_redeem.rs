//! End-to-end Issue/Redeem scenarios (§8), exercised against the public
//! crate API rather than any internal module boundary.

use time::OffsetDateTime;

use voprf_token_service::dleq::BatchDleqProof;
use voprf_token_service::error::{TokenError, WorkerError};
use voprf_token_service::group::{HashToCurveMethod, Point, Scalar};
use voprf_token_service::ledger::Ledger;
use voprf_token_service::issuer::{
    rotate_due_issuers, Issuer, IssuerCache, IssuerRecordV1, IssuerRegistry, InMemoryIssuerRegistry,
    PublicCommitment,
};
use voprf_token_service::ledger::InMemoryLedger;
use voprf_token_service::proto::wire::{b64_decode, b64_encode};
use voprf_token_service::proto::{handle_issue, handle_redeem, BlindTokenRequest, RedeemStatus, RequestType};
use voprf_token_service::voprf::{blind, check_request_binding, create_request_binding, derive_key, unblind};

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
        max_tokens: 50,
        created_at: OffsetDateTime::now_utc(),
        expires_at: None,
        rotated_at: None,
    });
    (issuer, x)
}

/// S1: Issue succeeds and the batch proof verifies against the client's own
/// view of the blinded/signed points.
#[test]
fn issue_then_client_side_proof_verification() {
    let (issuer, x) = sample_issuer();
    let mut blinds = Vec::new();
    let mut contents = Vec::new();
    for _ in 0..20 {
        let t = Point::hash_to_curve(&rand_preimage(), HashToCurveMethod::Swu).unwrap();
        let (p, r) = blind(&t);
        blinds.push((t, r));
        contents.push(b64_encode(&p.encode_uncompressed()));
    }
    let request = BlindTokenRequest {
        request_type: RequestType::Issue,
        contents: contents.clone(),
    };
    let response = handle_issue(&request, &issuer, OffsetDateTime::now_utc()).unwrap();

    let ps: Vec<Point> = contents.iter().map(|c| Point::decode(&b64_decode(c).unwrap()).unwrap()).collect();
    let qs: Vec<Point> = response.sigs.iter().map(|s| Point::decode(&b64_decode(s).unwrap()).unwrap()).collect();
    let proof = BatchDleqProof::unmarshal(&response.proof).unwrap();
    assert!(proof.verify(&ps, &qs));

    for ((t, r), q) in blinds.iter().zip(qs.iter()) {
        let n = unblind(q, r).unwrap();
        assert_eq!(n, t.scalar_mul(&x));
    }
}

fn rand_preimage() -> [u8; 32] {
    use rand_core::RngCore;
    let mut buf = [0u8; 32];
    rand_core::OsRng.fill_bytes(&mut buf);
    buf
}

/// S2: a token redeems once, then reports duplicate on replay.
#[tokio::test]
async fn token_redeems_once_then_duplicate_on_replay() {
    let (issuer, x) = sample_issuer();
    let ledger = InMemoryLedger::new();
    let preimage = rand_preimage();
    // No h2c_params element below: exercises the Redeem default (increment).
    let t = Point::hash_to_curve(&preimage, HashToCurveMethod::Increment).unwrap();
    let n = t.scalar_mul(&x);
    let k = derive_key(&n, &preimage);
    let mac = create_request_binding(&k, &[b"example.com", b"/page"]);
    let request = BlindTokenRequest {
        request_type: RequestType::Redeem,
        contents: vec![b64_encode(&preimage), b64_encode(&mac)],
    };

    let first = handle_redeem(
        &request,
        &issuer,
        &ledger,
        "example.com",
        "/page",
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
        "/page",
        OffsetDateTime::now_utc(),
        1,
        &[],
        None,
    )
    .await
    .unwrap();
    assert_eq!(second, RedeemStatus::DuplicateRedemption);
}

/// S3: a MAC computed over the wrong host is rejected, and the ledger never
/// records the attempt.
#[tokio::test]
async fn mismatched_binding_context_is_rejected_and_not_recorded() {
    let (issuer, x) = sample_issuer();
    let ledger = InMemoryLedger::new();
    let preimage = rand_preimage();
    let t = Point::hash_to_curve(&preimage, HashToCurveMethod::Increment).unwrap();
    let n = t.scalar_mul(&x);
    let k = derive_key(&n, &preimage);
    let mac = create_request_binding(&k, &[b"example.com", b"/page"]);
    assert!(check_request_binding(&k, &mac, &[b"example.com", b"/page"]));

    let request = BlindTokenRequest {
        request_type: RequestType::Redeem,
        contents: vec![b64_encode(&preimage), b64_encode(&mac)],
    };
    let result = handle_redeem(
        &request,
        &issuer,
        &ledger,
        "attacker.example",
        "/page",
        OffsetDateTime::now_utc(),
        0,
        &[],
        None,
    )
    .await;
    assert!(matches!(result, Err(WorkerError::Token(TokenError::InvalidMac))));

    let id = voprf_token_service::ledger::redemption_id(issuer.id(), &preimage);
    assert!(ledger.get(id).await.unwrap().is_none());
}

/// S4: too many tokens in one Issue request is rejected before any signing
/// happens.
#[test]
fn issue_rejects_batches_over_the_issuers_max_tokens() {
    let (issuer, _) = sample_issuer();
    let contents: Vec<String> = (0..51)
        .map(|_| b64_encode(&Point::generator().encode_uncompressed()))
        .collect();
    let request = BlindTokenRequest {
        request_type: RequestType::Issue,
        contents,
    };
    let result = handle_issue(&request, &issuer, OffsetDateTime::now_utc());
    assert!(matches!(result, Err(TokenError::TooManyTokens)));
}

/// S5: a batch proof fails to verify if even one signed point is swapped
/// for one produced under a different key.
#[test]
fn tampered_batch_proof_is_rejected() {
    let (issuer, _) = sample_issuer();
    let (other_issuer, _) = sample_issuer();
    let mut contents = Vec::new();
    for _ in 0..5 {
        let t = Point::hash_to_curve(&rand_preimage(), HashToCurveMethod::Swu).unwrap();
        let (p, _r) = blind(&t);
        contents.push(b64_encode(&p.encode_uncompressed()));
    }
    let request = BlindTokenRequest {
        request_type: RequestType::Issue,
        contents: contents.clone(),
    };
    let response = handle_issue(&request, &issuer, OffsetDateTime::now_utc()).unwrap();
    let other_response = handle_issue(&request, &other_issuer, OffsetDateTime::now_utc()).unwrap();

    let ps: Vec<Point> = contents.iter().map(|c| Point::decode(&b64_decode(c).unwrap()).unwrap()).collect();
    let mut qs: Vec<Point> = response.sigs.iter().map(|s| Point::decode(&b64_decode(s).unwrap()).unwrap()).collect();
    // swap in one signature produced under a different issuer's key
    qs[0] = Point::decode(&b64_decode(&other_response.sigs[0]).unwrap()).unwrap();

    let proof = BatchDleqProof::unmarshal(&response.proof).unwrap();
    assert!(!proof.verify(&ps, &qs));
}

/// S6: a token issued under a v1 issuer's predecessor key still redeems
/// correctly after a rotation tick has rolled that issuer over — rotation
/// marks the predecessor `rotated_at` but never deletes or expires its
/// signing key, so in-flight tokens must survive the boundary.
#[tokio::test]
async fn rotation_crosses_the_boundary() {
    let registry = InMemoryIssuerRegistry::new();
    let cache = IssuerCache::new(std::time::Duration::from_secs(60));
    let ledger = InMemoryLedger::new();
    let now = OffsetDateTime::now_utc();

    let (issuer, x) = sample_issuer();
    let predecessor_id = issuer.id();
    registry.create(issuer.clone()).await.unwrap();

    // Issue and blind-verify a token against the predecessor before rotation.
    let preimage = rand_preimage();
    let t = Point::hash_to_curve(&preimage, HashToCurveMethod::Increment).unwrap();
    let (p, r) = blind(&t);
    let request = BlindTokenRequest {
        request_type: RequestType::Issue,
        contents: vec![b64_encode(&p.encode_uncompressed())],
    };
    let response = handle_issue(&request, &issuer, now).unwrap();
    let q = Point::decode(&b64_decode(&response.sigs[0]).unwrap()).unwrap();
    let n = unblind(&q, &r).unwrap();
    let k = derive_key(&n, &preimage);
    let mac = create_request_binding(&k, &[b"example.com", b"/page"]);

    // Force this issuer past the rotation horizon and roll it over.
    let mut predecessor_record = match &issuer {
        Issuer::V1(r) => r.clone(),
        _ => unreachable!(),
    };
    predecessor_record.expires_at = Some(now + time::Duration::days(1));
    let pre_rotation_issuer = Issuer::V1(predecessor_record);
    registry.update(pre_rotation_issuer).await.unwrap();

    let outcomes = rotate_due_issuers(&registry, &cache, now, 7, 30, 2, time::Duration::days(7))
        .await
        .unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0].predecessor, predecessor_id);

    // Redeem against the now-rotated predecessor, fetched fresh from the
    // registry the way the worker pipeline would.
    let rotated_predecessor = registry.fetch_by_id(predecessor_id).await.unwrap().unwrap();
    assert!(rotated_predecessor.rotated_at().is_some());

    let redeem_request = BlindTokenRequest {
        request_type: RequestType::Redeem,
        contents: vec![b64_encode(&preimage), b64_encode(&mac)],
    };
    let status = handle_redeem(
        &redeem_request,
        &rotated_predecessor,
        &ledger,
        "example.com",
        "/page",
        now,
        0,
        &[],
        None,
    )
    .await
    .unwrap();
    assert_eq!(status, RedeemStatus::Ok);
}
