use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::ballot::{AuditQuery, AuditRecord, CandidateId, Poll, Tally};
use crate::invites::InviteCode;
use crate::network::NetworkStats;
use crate::registry::{Member, MemberId};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};

/// Header naming the calling member.
pub const MEMBER_HEADER: &str = "x-member-id";

/// Header carrying the operator token.
pub const OPERATOR_HEADER: &str = "x-operator-token";

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    #[serde(flatten)]
    pub stats: NetworkStats,
}

#[derive(Debug, Deserialize)]
pub struct RedeemRequest {
    pub code: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub member_id: String,
    pub candidate_id: CandidateId,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TallyResponse {
    pub candidate_id: CandidateId,
    pub votes: u64,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        stats: state.network.stats().await,
    })
}

pub async fn redeem_invite(
    State(state): State<AppState>,
    Json(request): Json<RedeemRequest>,
) -> ApiResult<(StatusCode, Json<Member>)> {
    let member = state
        .network
        .redeem_invite(&request.code, &request.name)
        .await?;
    Ok((StatusCode::CREATED, Json(member)))
}

pub async fn list_members(State(state): State<AppState>) -> Json<Vec<Member>> {
    Json(state.network.list_members().await)
}

pub async fn get_member(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Member>> {
    Ok(Json(state.network.get_member(&MemberId::new(id)).await?))
}

pub async fn lineage(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<MemberId>>> {
    Ok(Json(state.network.lineage(&MemberId::new(id)).await?))
}

pub async fn invitees(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<Member>>> {
    Ok(Json(state.network.invitees(&MemberId::new(id)).await?))
}

/// A member's own codes. Only the owner may list them.
pub async fn owned_codes(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<InviteCode>>> {
    let caller = headers.get(MEMBER_HEADER).and_then(|v| v.to_str().ok());
    if caller != Some(id.as_str()) {
        tracing::debug!(member = %id, "code listing refused: caller is not the owner");
        return Err(ApiError::Forbidden(
            "Invite codes are visible to their owner only".to_string(),
        ));
    }
    Ok(Json(state.network.list_owned_codes(&MemberId::new(id)).await?))
}

pub async fn poll(State(state): State<AppState>) -> Json<Poll> {
    Json(state.network.poll().await)
}

/// Operator routes need the configured token in `x-operator-token`.
fn require_operator(state: &AppState, headers: &HeaderMap) -> ApiResult<()> {
    let Some(expected) = state.operator_token.as_deref() else {
        tracing::debug!("operator request refused: no operator token configured");
        return Err(ApiError::Forbidden("Operator routes are disabled".to_string()));
    };

    match headers.get(OPERATOR_HEADER).and_then(|v| v.to_str().ok()) {
        Some(token) if token == expected => Ok(()),
        Some(_) => {
            tracing::warn!("invalid operator token provided");
            Err(ApiError::Forbidden("Invalid operator token".to_string()))
        }
        None => Err(ApiError::Forbidden("Operator token required".to_string())),
    }
}

pub async fn suspend_member(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<Member>> {
    require_operator(&state, &headers)?;
    Ok(Json(state.network.suspend_member(&MemberId::new(id)).await?))
}

pub async fn reinstate_member(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<Member>> {
    require_operator(&state, &headers)?;
    Ok(Json(state.network.reinstate_member(&MemberId::new(id)).await?))
}

pub async fn close_poll(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Poll>> {
    require_operator(&state, &headers)?;
    Ok(Json(state.network.close_poll().await?))
}

pub async fn cast_vote(
    State(state): State<AppState>,
    Json(request): Json<VoteRequest>,
) -> ApiResult<(StatusCode, Json<AuditRecord>)> {
    let record = state
        .network
        .cast_vote(&MemberId::new(request.member_id), request.candidate_id)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn tally(
    State(state): State<AppState>,
    Path(candidate_id): Path<CandidateId>,
) -> Json<TallyResponse> {
    Json(TallyResponse {
        candidate_id,
        votes: state.network.tally(candidate_id).await,
    })
}

pub async fn results(State(state): State<AppState>) -> Json<Vec<Tally>> {
    Json(state.network.results().await)
}

pub async fn audit_log(
    State(state): State<AppState>,
    Query(query): Query<AuditQuery>,
) -> Json<Vec<AuditRecord>> {
    Json(state.network.query_audit_log(&query).await)
}
