//! Worker pipeline (C7, §4.7): drains a stream of request-set messages,
//! dispatches each to the Issue or Redeem handler, classifies failures as
//! permanent or temporary, and emits a `ResultSet` per message.
//!
//! State machine (mirrors §4.7):
//! ```text
//! RECEIVED -> DECODED -> (ISSUE:signed | REDEEM:verified) -> LEDGER? -> EMITTED
//!          \-> permanent-error -> EMITTED(result=ERROR/...)
//!          \-> temporary-error -> REQUEUED(backoff)
//! ```

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use super::stream::{
    RedeemResultStatus, RequestRecord, RequestSet, ResultRecord, ResultSet, SignStatus,
};
use crate::error::{TokenError, WorkerError};
use crate::issuer::{Issuer, IssuerCache, IssuerRegistry};
use crate::ledger::{Equivalence, Ledger, SpentTokenFilter};
use crate::proto::wire::{b64_decode, b64_encode};
use crate::proto::{handle_issue, handle_redeem, BlindTokenRequest, RedeemStatus, RequestType};

/// Backoff applied to temporary errors before requeue, per §7.
pub const TEMPORARY_BACKOFF: Duration = Duration::from_secs(60);

pub struct WorkerContext {
    pub registry: Arc<dyn IssuerRegistry>,
    pub ledger: Arc<dyn Ledger>,
    pub cache: Arc<IssuerCache>,
    pub filter: Option<Arc<SpentTokenFilter>>,
    pub tolerable_equivalence: Vec<Equivalence>,
}

/// Outcome of handling one message: either it should be emitted now, or
/// requeued after `TEMPORARY_BACKOFF`.
pub enum Outcome {
    Emit(ResultSet),
    Requeue { request_set: RequestSet, after: Duration },
}

/// Processes a single request-set message (one state-machine traversal).
pub async fn process_message(ctx: &WorkerContext, request_set: RequestSet) -> Outcome {
    let request_id = request_set.request_id.clone();
    let record = match super::stream::validate_request_set(&request_set) {
        Ok(r) => r.clone(),
        Err(schema_err) => {
            warn!(request_id = %request_id, error = %schema_err, "schema violation, permanent");
            return Outcome::Emit(ResultSet {
                request_id,
                data: vec![ResultRecord::Sign {
                    signed_tokens: None,
                    proof: None,
                    issuer_public_key: None,
                    status: SignStatus::Error,
                    associated_data: vec![],
                    valid_from: None,
                    valid_to: None,
                }],
            });
        }
    };

    match handle_record(ctx, &record, request_set.offset).await {
        Ok(result) => Outcome::Emit(ResultSet {
            request_id,
            data: vec![result],
        }),
        Err(WorkerError::Ledger(crate::error::LedgerError::TransientStorage(msg))) => {
            warn!(request_id = %request_id, error = %msg, "temporary storage failure, requeuing");
            Outcome::Requeue {
                request_set,
                after: TEMPORARY_BACKOFF,
            }
        }
        Err(permanent) => {
            error!(request_id = %request_id, error = %permanent, "permanent failure");
            let result = match &record {
                RequestRecord::Sign { associated_data, .. } => ResultRecord::Sign {
                    signed_tokens: None,
                    proof: None,
                    issuer_public_key: None,
                    status: sign_status_for(&permanent),
                    associated_data: associated_data.clone(),
                    valid_from: None,
                    valid_to: None,
                },
                RequestRecord::Redeem { associated_data, .. } => ResultRecord::Redeem {
                    issuer_name: String::new(),
                    issuer_cohort: 0,
                    status: redeem_status_for(&permanent),
                    associated_data: associated_data.clone(),
                },
            };
            Outcome::Emit(ResultSet {
                request_id,
                data: vec![result],
            })
        }
    }
}

fn sign_status_for(err: &WorkerError) -> SignStatus {
    match err {
        WorkerError::Token(TokenError::InvalidIssuer) => SignStatus::InvalidIssuer,
        _ => SignStatus::Error,
    }
}

fn redeem_status_for(err: &WorkerError) -> RedeemResultStatus {
    match err {
        WorkerError::Token(TokenError::InvalidMac) => RedeemResultStatus::Unverified,
        WorkerError::Ledger(crate::error::LedgerError::DuplicateRedemption(_)) => {
            RedeemResultStatus::DuplicateRedemption
        }
        _ => RedeemResultStatus::Error,
    }
}

async fn handle_record(
    ctx: &WorkerContext,
    record: &RequestRecord,
    offset: u64,
) -> Result<ResultRecord, WorkerError> {
    match record {
        RequestRecord::Sign {
            blinded_tokens,
            issuer_type,
            issuer_cohort,
            associated_data,
        } => {
            let now = OffsetDateTime::now_utc();
            let cohort = (*issuer_cohort).clamp(0, 1) as u8;
            let issuer = ctx
                .registry
                .latest_active(issuer_type, cohort, now)
                .await?
                .ok_or(TokenError::InvalidIssuer)?;

            let request = BlindTokenRequest {
                request_type: RequestType::Issue,
                contents: blinded_tokens.clone(),
            };
            let response = handle_issue(&request, &issuer, now)?;
            Ok(ResultRecord::Sign {
                signed_tokens: Some(response.sigs),
                proof: Some(response.proof),
                issuer_public_key: None,
                status: SignStatus::Ok,
                associated_data: associated_data.clone(),
                valid_from: None,
                valid_to: None,
            })
        }
        RequestRecord::Redeem {
            token_preimage,
            signature,
            binding,
            public_key,
            associated_data,
        } => {
            let now = OffsetDateTime::now_utc();
            let (host, path) = binding.split_once('|').unwrap_or((binding.as_str(), ""));

            // With a public_key hint, resolve the issuer directly via the
            // by-signing-key cache instead of scanning the registry.
            let candidates: Vec<Issuer> = match public_key.as_deref().map(b64_decode).transpose()? {
                Some(pubkey_bytes) => match ctx.cache.get_by_signing_key(&pubkey_bytes) {
                    Some(issuer) => vec![issuer],
                    None => ctx.registry.fetch_all().await?,
                },
                None => ctx.registry.fetch_all().await?,
            };
            let request = BlindTokenRequest {
                request_type: RequestType::Redeem,
                contents: vec![
                    b64_encode(&b64_decode(token_preimage)?),
                    b64_encode(&b64_decode(signature)?),
                ],
            };

            if candidates.is_empty() {
                return Err(TokenError::InvalidIssuer.into());
            }
            let mut last_err = WorkerError::Token(TokenError::InvalidMac);
            for issuer in &candidates {
                match handle_redeem(
                    &request,
                    issuer,
                    ctx.ledger.as_ref(),
                    host,
                    path,
                    now,
                    offset,
                    &ctx.tolerable_equivalence,
                    ctx.filter.as_deref(),
                )
                .await
                {
                    Ok(RedeemStatus::Ok) => {
                        info!(issuer = %issuer.issuer_type(), "redemption accepted");
                        return Ok(ResultRecord::Redeem {
                            issuer_name: issuer.issuer_type().to_string(),
                            issuer_cohort: issuer.cohort() as i32,
                            status: RedeemResultStatus::Ok,
                            associated_data: associated_data.clone(),
                        });
                    }
                    Ok(RedeemStatus::DuplicateRedemption) => {
                        return Ok(ResultRecord::Redeem {
                            issuer_name: issuer.issuer_type().to_string(),
                            issuer_cohort: issuer.cohort() as i32,
                            status: RedeemResultStatus::DuplicateRedemption,
                            associated_data: associated_data.clone(),
                        });
                    }
                    Ok(RedeemStatus::Unverified) | Err(WorkerError::Token(TokenError::InvalidMac)) => {
                        last_err = WorkerError::Token(TokenError::InvalidMac);
                        continue;
                    }
                    Err(other) => return Err(other),
                }
            }
            Err(last_err)
        }
    }
}

/// Runs `count` worker tasks draining `input`, emitting onto `output`, until
/// `shutdown` is signalled. Workers finish their current message before
/// exiting (§5).
pub fn spawn_workers(
    count: usize,
    ctx: Arc<WorkerContext>,
    input: mpsc::Receiver<RequestSet>,
    output: mpsc::Sender<ResultSet>,
    requeue: mpsc::Sender<(RequestSet, Duration)>,
    shutdown: watch::Receiver<bool>,
) -> Vec<tokio::task::JoinHandle<()>> {
    let input = Arc::new(tokio::sync::Mutex::new(input));
    (0..count)
        .map(|worker_id| {
            let ctx = ctx.clone();
            let input = input.clone();
            let output = output.clone();
            let requeue = requeue.clone();
            let mut shutdown = shutdown.clone();
            tokio::spawn(async move {
                loop {
                    let next = {
                        let mut guard = input.lock().await;
                        tokio::select! {
                            biased;
                            _ = shutdown.changed() => None,
                            msg = guard.recv() => msg,
                        }
                    };
                    let Some(request_set) = next else {
                        info!(worker_id, "worker shutting down");
                        break;
                    };
                    match process_message(&ctx, request_set).await {
                        Outcome::Emit(result_set) => {
                            if output.send(result_set).await.is_err() {
                                break;
                            }
                        }
                        Outcome::Requeue { request_set, after } => {
                            // Requeue-to-source is the external stream
                            // transport's responsibility (out of scope);
                            // this channel stands in for that redelivery
                            // request.
                            let _ = requeue.send((request_set, after)).await;
                        }
                    }
                }
            })
        })
        .collect()
}
