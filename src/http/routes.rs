//! The legacy synchronous HTTP surface (§6). Kept deliberately thin: every
//! handler delegates to the same `proto`/`issuer`/`ledger` functions the
//! worker pipeline uses, so the two surfaces can never drift in semantics.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;

use crate::error::{LedgerError, TokenError, WorkerError};
use crate::group::Point;
use crate::issuer::{Issuer, IssuerCache, IssuerRecordV1, IssuerRegistry, PublicCommitment};
use crate::ledger::{self, redemption_id, Equivalence, Ledger, SpentTokenFilter};
use crate::proto::wire::{b64_decode, b64_encode};
use crate::proto::{handle_issue, handle_redeem, verify_redeem, BlindTokenRequest, RedeemStatus, RequestType};

/// Soft per-request deadline (§5), applied uniformly to every handler.
const HANDLER_DEADLINE: Duration = Duration::from_secs(60);

pub struct AppState {
    pub registry: Arc<dyn IssuerRegistry>,
    pub ledger: Arc<dyn Ledger>,
    pub cache: Arc<IssuerCache>,
    pub filter: Option<Arc<SpentTokenFilter>>,
    pub tolerable_equivalence: Vec<Equivalence>,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/issuer/", post(create_issuer))
        .route("/v1/issuer/:type", get(get_issuer))
        .route("/v1/blindedToken/:type", post(issue_tokens))
        .route("/v1/blindedToken/:type/redemption/", post(redeem_token))
        .route("/v1/blindedToken/bulk/redemption/", post(bulk_redeem))
        .route("/v1/blindedToken/:id/redemption/:token_id", get(get_redemption))
        .with_state(state)
}

async fn with_deadline<F, T>(fut: F) -> Result<T, Response>
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(HANDLER_DEADLINE, fut)
        .await
        .map_err(|_| (StatusCode::GATEWAY_TIMEOUT, "request deadline exceeded").into_response())
}

#[derive(Deserialize)]
struct CreateIssuerBody {
    name: String,
    max_tokens: usize,
    #[serde(default)]
    expires_at: Option<String>,
}

#[instrument(skip(state, body))]
async fn create_issuer(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateIssuerBody>,
) -> Response {
    let outcome = with_deadline(async move {
        let x = crate::group::Scalar::random();
        let g = Point::generator().scalar_mul(&crate::group::Scalar::random());
        let h = g.scalar_mul(&x);
        let expires_at = body
            .expires_at
            .as_deref()
            .and_then(|s| OffsetDateTime::parse(s, &time::format_description::well_known::Rfc3339).ok());
        let issuer = Issuer::V1(IssuerRecordV1 {
            id: Uuid::new_v4(),
            issuer_type: body.name,
            cohort: 0,
            signing_key: x,
            commitment: PublicCommitment { g, h },
            max_tokens: body.max_tokens,
            created_at: OffsetDateTime::now_utc(),
            expires_at,
            rotated_at: None,
        });
        state.registry.create(issuer.clone()).await?;
        state.cache.put(issuer);
        Ok::<_, TokenError>(())
    })
    .await;

    match outcome {
        Ok(Ok(())) => StatusCode::OK.into_response(),
        Ok(Err(e)) => token_error_response(e),
        Err(resp) => resp,
    }
}

#[derive(Serialize)]
struct IssuerSummary {
    id: Uuid,
    name: String,
    public_key: String,
}

#[instrument(skip(state))]
async fn get_issuer(State(state): State<Arc<AppState>>, Path(issuer_type): Path<String>) -> Response {
    let outcome = with_deadline(async move {
        if let Some(cached) = state.cache.get_by_type_cohort(&issuer_type, 0) {
            return Ok::<_, TokenError>(Some(cached));
        }
        let issuer = state
            .registry
            .latest_active(&issuer_type, 0, OffsetDateTime::now_utc())
            .await?;
        if let Some(ref i) = issuer {
            state.cache.put(i.clone());
        }
        Ok(issuer)
    })
    .await;

    match outcome {
        Ok(Ok(Some(issuer))) => {
            let commitment = issuer.current_signing_key(OffsetDateTime::now_utc()).map(|(_, c)| c);
            let public_key = commitment
                .map(|c| b64_encode(&c.h.encode_uncompressed()))
                .unwrap_or_default();
            Json(IssuerSummary {
                id: issuer.id(),
                name: issuer.issuer_type().to_string(),
                public_key,
            })
            .into_response()
        }
        Ok(Ok(None)) => StatusCode::NOT_FOUND.into_response(),
        Ok(Err(e)) => token_error_response(e),
        Err(resp) => resp,
    }
}

#[derive(Deserialize)]
struct IssueBody {
    blinded_tokens: Vec<String>,
    #[serde(default)]
    cohort: Option<u8>,
}

#[derive(Serialize)]
struct IssueBodyResponse {
    batch_proof: String,
    signed_tokens: Vec<String>,
    public_key: String,
}

#[instrument(skip(state, body))]
async fn issue_tokens(
    State(state): State<Arc<AppState>>,
    Path(issuer_type): Path<String>,
    Json(body): Json<IssueBody>,
) -> Response {
    let outcome = with_deadline(async move {
        let now = OffsetDateTime::now_utc();
        let issuer = state
            .registry
            .latest_active(&issuer_type, body.cohort.unwrap_or(0), now)
            .await?
            .ok_or(TokenError::InvalidIssuer)?;
        let request = BlindTokenRequest {
            request_type: RequestType::Issue,
            contents: body.blinded_tokens,
        };
        let response = handle_issue(&request, &issuer, now)?;
        let public_key = issuer
            .current_signing_key(now)
            .map(|(_, c)| b64_encode(&c.h.encode_uncompressed()))
            .unwrap_or_default();
        Ok::<_, TokenError>(IssueBodyResponse {
            batch_proof: response.proof,
            signed_tokens: response.sigs,
            public_key,
        })
    })
    .await;

    match outcome {
        Ok(Ok(body)) => Json(body).into_response(),
        Ok(Err(e)) => token_error_response(e),
        Err(resp) => resp,
    }
}

#[derive(Deserialize)]
struct RedeemBody {
    t: String,
    signature: String,
    #[serde(default)]
    payload: Option<String>,
}

#[instrument(skip(state, body))]
async fn redeem_token(
    State(state): State<Arc<AppState>>,
    Path(issuer_type): Path<String>,
    Json(body): Json<RedeemBody>,
) -> Response {
    let outcome = with_deadline(async move {
        let now = OffsetDateTime::now_utc();
        let issuer = state
            .registry
            .latest_active(&issuer_type, 0, now)
            .await?
            .ok_or(TokenError::InvalidIssuer)?;
        let (host, path) = body
            .payload
            .as_deref()
            .and_then(|p| p.split_once('|'))
            .unwrap_or(("", ""));
        let request = BlindTokenRequest {
            request_type: RequestType::Redeem,
            contents: vec![body.t, body.signature],
        };
        handle_redeem(
            &request,
            &issuer,
            state.ledger.as_ref(),
            host,
            path,
            now,
            0,
            &state.tolerable_equivalence,
            state.filter.as_deref(),
        )
        .await
    })
    .await;

    match outcome {
        Ok(Ok(RedeemStatus::Ok)) => StatusCode::OK.into_response(),
        Ok(Ok(RedeemStatus::DuplicateRedemption)) => StatusCode::CONFLICT.into_response(),
        Ok(Ok(RedeemStatus::Unverified)) => StatusCode::BAD_REQUEST.into_response(),
        Ok(Err(e)) => worker_error_response(e),
        Err(resp) => resp,
    }
}

#[derive(Deserialize)]
struct BulkRedeemToken {
    t: String,
    signature: String,
    issuer: String,
}

#[derive(Deserialize)]
struct BulkRedeemBody {
    payload: Option<String>,
    tokens: Vec<BulkRedeemToken>,
}

/// All-or-nothing: every token is verified and turned into a `Redemption`
/// first, then the whole batch is committed to the ledger in a single
/// [`ledger::redeem_all`] call. A conflict anywhere in the batch — a MAC
/// failure during verification, or a duplicate at commit time — leaves the
/// ledger exactly as it was before this request, with no partial credit
/// for tokens earlier in the batch.
#[instrument(skip(state, body))]
async fn bulk_redeem(State(state): State<Arc<AppState>>, Json(body): Json<BulkRedeemBody>) -> Response {
    let outcome = with_deadline(async move {
        let now = OffsetDateTime::now_utc();
        let (host, path) = body
            .payload
            .as_deref()
            .and_then(|p| p.split_once('|'))
            .unwrap_or(("", ""));

        let mut redemptions = Vec::with_capacity(body.tokens.len());
        for (offset, token) in body.tokens.iter().enumerate() {
            let issuer = state
                .registry
                .latest_active(&token.issuer, 0, now)
                .await?
                .ok_or(TokenError::InvalidIssuer)?;
            let request = BlindTokenRequest {
                request_type: RequestType::Redeem,
                contents: vec![token.t.clone(), token.signature.clone()],
            };
            let redemption = verify_redeem(&request, &issuer, host, path, now, offset as u64)?;
            redemptions.push(redemption);
        }

        ledger::redeem_all(state.ledger.as_ref(), redemptions, state.filter.as_deref())
            .await
            .map_err(WorkerError::Ledger)
    })
    .await;

    match outcome {
        Ok(Ok(())) => StatusCode::OK.into_response(),
        Ok(Err(e)) => worker_error_response(e),
        Err(resp) => resp,
    }
}

#[derive(Serialize)]
struct RedemptionView {
    id: Uuid,
    issuer_id: Uuid,
    timestamp: String,
}

#[instrument(skip(state))]
async fn get_redemption(
    State(state): State<Arc<AppState>>,
    Path((issuer_id, token_id)): Path<(Uuid, String)>,
) -> Response {
    let outcome = with_deadline(async move {
        let preimage = b64_decode(&token_id)?;
        let id = redemption_id(issuer_id, &preimage);
        state.ledger.get(id).await.map_err(|_| TokenError::InvalidFormat)
    })
    .await;

    match outcome {
        Ok(Ok(Some(r))) => Json(RedemptionView {
            id: r.id,
            issuer_id: r.issuer_id,
            timestamp: r.timestamp.to_string(),
        })
        .into_response(),
        Ok(Ok(None)) => StatusCode::BAD_REQUEST.into_response(),
        Ok(Err(_)) => StatusCode::BAD_REQUEST.into_response(),
        Err(resp) => resp,
    }
}

fn token_error_response(e: TokenError) -> Response {
    match e {
        TokenError::InvalidIssuer => StatusCode::NOT_FOUND.into_response(),
        _ => (StatusCode::BAD_REQUEST, e.to_string()).into_response(),
    }
}

fn worker_error_response(e: WorkerError) -> Response {
    match e {
        WorkerError::Ledger(LedgerError::DuplicateRedemption(_)) => StatusCode::CONFLICT.into_response(),
        WorkerError::Token(t) => token_error_response(t),
        WorkerError::Ledger(LedgerError::TransientStorage(_)) => {
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
        WorkerError::Schema(_) => StatusCode::BAD_REQUEST.into_response(),
    }
}
