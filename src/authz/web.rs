use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};

use crate::authz::cache::MetadataSource;
use crate::authz::engine::{today_start, EngineService};
use crate::authz::errors::AuthzError;
use crate::authz::types::{
    ApiResponse, ListPolicyIdsQuery, ListPolicyQuery, MaxPolicyIdQuery, MaxPolicyIdResponse,
    PolicyIdsResponse,
};

pub fn router<S>(service: Arc<EngineService<S>>) -> Router
where
    S: MetadataSource + 'static,
{
    Router::new()
        .route("/api/v1/engine/policies", get(list_policies::<S>))
        .route("/api/v1/engine/policies/ids", get(list_policy_ids::<S>))
        .route("/api/v1/engine/policies/ids/max", get(max_policy_id::<S>))
        .route("/healthz", get(health))
        .with_state(service)
}

fn bad_query(rejection: QueryRejection) -> Response {
    AuthzError::Validation(rejection.body_text()).into_response()
}

async fn list_policies<S: MetadataSource + 'static>(
    State(service): State<Arc<EngineService<S>>>,
    query: Result<Query<ListPolicyQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(q) => q,
        Err(rejection) => return bad_query(rejection),
    };
    match service.list_policies(query, today_start()).await {
        Ok(data) => Json(ApiResponse::ok(data)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn list_policy_ids<S: MetadataSource + 'static>(
    State(service): State<Arc<EngineService<S>>>,
    query: Result<Query<ListPolicyIdsQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(q) => q,
        Err(rejection) => return bad_query(rejection),
    };
    match service.list_policy_ids(query).await {
        Ok(ids) => Json(ApiResponse::ok(PolicyIdsResponse { ids })).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn max_policy_id<S: MetadataSource + 'static>(
    State(service): State<Arc<EngineService<S>>>,
    query: Result<Query<MaxPolicyIdQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(q) => q,
        Err(rejection) => return bad_query(rejection),
    };
    match service.max_policy_id(query).await {
        Ok(id) => Json(ApiResponse::ok(MaxPolicyIdResponse { id })).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}
