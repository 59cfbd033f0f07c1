//! HTTP API over the trust network.
//!
//! Thin handlers: each one calls a single `TrustNetwork` operation. Writes
//! reach the store inside those operations, so an answered mutation is
//! already durable.

pub mod error;
pub mod routes;

pub use error::{ApiError, ApiResult, ErrorBody};
pub use routes::{MEMBER_HEADER, OPERATOR_HEADER};

use crate::network::TrustNetwork;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub network: Arc<TrustNetwork>,
    /// Shared secret for the operator routes. They refuse every request
    /// while unset.
    pub operator_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(network: Arc<TrustNetwork>) -> Self {
        Self {
            network,
            operator_token: None,
        }
    }

    pub fn with_operator_token(mut self, token: impl Into<String>) -> Self {
        self.operator_token = Some(Arc::from(token.into()));
        self
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/invites/redeem", post(routes::redeem_invite))
        .route("/members", get(routes::list_members))
        .route("/members/:id", get(routes::get_member))
        .route("/members/:id/lineage", get(routes::lineage))
        .route("/members/:id/invitees", get(routes::invitees))
        .route("/members/:id/codes", get(routes::owned_codes))
        .route("/members/:id/suspend", post(routes::suspend_member))
        .route("/members/:id/reinstate", post(routes::reinstate_member))
        .route("/poll", get(routes::poll))
        .route("/poll/close", post(routes::close_poll))
        .route("/votes", post(routes::cast_vote))
        .route("/tally/:candidate_id", get(routes::tally))
        .route("/results", get(routes::results))
        .route("/audit", get(routes::audit_log))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
