use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;

use stake_core::api::*;
use stake_core::coordinator::Coordinator;
use stake_core::types::{normalize_token, Resource};

use crate::error::ApiError;
use crate::server::AppState;

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

/// Runs a store call off the async runtime.
async fn with_coordinator<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Coordinator) -> stake_core::error::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let coordinator = state.coordinator.clone();
    Ok(tokio::task::spawn_blocking(move || f(&coordinator)).await??)
}

// ─── Public ─────────────────────────────────────────────────────────────────

pub async fn health(State(state): State<AppState>) -> ApiResult<HealthReport> {
    let live_leases = with_coordinator(&state, |c| c.live_lease_count()).await?;
    Ok(Json(ApiResponse::ok(HealthReport {
        status: "ok".to_string(),
        live_leases,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })))
}

pub async fn list_resources(
    State(state): State<AppState>,
    query: Result<Query<StatusQuery>, QueryRejection>,
) -> ApiResult<StatusReport> {
    let Query(query) = query?;
    let report = with_coordinator(&state, move |c| c.status_report(query.holder_token.as_deref())).await?;
    Ok(Json(ApiResponse::ok(report)))
}

pub async fn acquire_lease(
    State(state): State<AppState>,
    payload: Result<Json<AcquireRequest>, JsonRejection>,
) -> ApiResult<LeaseGrant> {
    let Json(req) = payload?;
    let renewing = req.holder_token.as_deref().is_some_and(|t| !t.trim().is_empty());

    let result = with_coordinator(&state, move |c| {
        c.acquire(&req.resource_key, req.holder_token.as_deref())
    })
    .await;

    match result {
        Ok(lease) => {
            if renewing {
                tracing::debug!(resource_key = %lease.resource_key, expires_at = lease.expires_at, "Lease renewed");
            } else {
                tracing::info!(resource_key = %lease.resource_key, expires_at = lease.expires_at, "Lease acquired");
            }
            Ok(Json(ApiResponse::ok(LeaseGrant::from(&lease))))
        }
        Err(e) => {
            tracing::info!(reason = e.0.code(), error = %e.0, "Lease denied");
            Err(e)
        }
    }
}

/// Always answers 200 for a well-formed request: a lease that is missing,
/// foreign or already expired is simply not released. The body is parsed
/// regardless of content type so page-unload beacons are accepted.
pub async fn release_lease(State(state): State<AppState>, body: Bytes) -> ApiResult<ReleaseAck> {
    let req: ReleaseRequest =
        serde_json::from_slice(&body).map_err(|e| ApiError::bad_request(e.to_string()))?;
    let Some(token) = normalize_token(req.holder_token.as_deref())? else {
        return Err(ApiError::bad_request("holder_token is required"));
    };
    let key = req.resource_key.clone();

    let released = match with_coordinator(&state, move |c| c.release(&req.resource_key, &token)).await {
        Ok(released) => released,
        Err(e) => {
            tracing::warn!(resource_key = %key, error = %e.0, "Release failed, reporting not released");
            false
        }
    };
    if released {
        tracing::info!(resource_key = %key, "Lease released");
    }
    Ok(Json(ApiResponse::ok(ReleaseAck { released })))
}

pub async fn commit_assignment(
    State(state): State<AppState>,
    payload: Result<Json<CommitRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<CommitReceipt>>), ApiError> {
    let Json(req) = payload?;

    let result = with_coordinator(&state, move |c| {
        c.commit(
            &req.resource_key,
            req.holder_token.as_deref(),
            &req.claimant_payload,
        )
    })
    .await;

    match result {
        Ok(assignment) => {
            tracing::info!(
                resource_key = %assignment.resource_key,
                assignment_id = %assignment.id,
                claimant = %assignment.claimant(),
                "Assignment committed"
            );
            Ok((
                StatusCode::CREATED,
                Json(ApiResponse::ok(CommitReceipt { assignment })),
            ))
        }
        Err(e) => {
            tracing::info!(reason = e.0.code(), error = %e.0, "Commit rejected");
            Err(e)
        }
    }
}

// ─── Admin ──────────────────────────────────────────────────────────────────

pub async fn overview(State(state): State<AppState>) -> ApiResult<Overview> {
    let overview = with_coordinator(&state, |c| c.overview()).await?;
    Ok(Json(ApiResponse::ok(overview)))
}

pub async fn put_resource(
    State(state): State<AppState>,
    Path(key): Path<String>,
    payload: Result<Json<ResourceUpdate>, JsonRejection>,
) -> ApiResult<Resource> {
    let Json(update) = payload?;
    let resource = Resource {
        key,
        name: update.name,
        is_active: update.is_active,
        sort_order: update.sort_order,
    };
    let saved = with_coordinator(&state, move |c| c.put_resource(resource)).await?;
    tracing::info!(resource_key = %saved.key, is_active = saved.is_active, "Resource saved");
    Ok(Json(ApiResponse::ok(saved)))
}

pub async fn delete_assignment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<String> {
    let target = id.clone();
    with_coordinator(&state, move |c| c.delete_assignment(&target)).await?;
    tracing::info!(assignment_id = %id, "Assignment deleted");
    Ok(Json(ApiResponse::ok(format!("Assignment '{}' deleted", id))))
}

pub async fn sweep(State(state): State<AppState>) -> ApiResult<SweepReport> {
    let evicted = with_coordinator(&state, |c| c.evict_expired()).await?;
    tracing::info!(evicted, "Expired leases evicted");
    Ok(Json(ApiResponse::ok(SweepReport { evicted })))
}
