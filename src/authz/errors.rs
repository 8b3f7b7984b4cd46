use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use miette::Diagnostic;
use serde_json::json;
use thiserror::Error;

use crate::authz::types::{CODE_BAD_REQUEST, CODE_SYSTEM_ERROR};
use crate::errors::HubError;

/// Failure of a single metadata lookup. Cloneable so the cache can remember it
/// for a short while.
#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum LookupError {
    #[error("`{key}` not found")]
    #[diagnostic(code(policyhub::lookup::not_found))]
    NotFound { key: String },

    #[error("loading `{key}` failed: {message}")]
    #[diagnostic(code(policyhub::lookup::backend))]
    Backend { key: String, message: String },
}

impl LookupError {
    pub fn key(&self) -> &str {
        match self {
            LookupError::NotFound { key } | LookupError::Backend { key, .. } => key,
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum AuthzError {
    #[error("action pk={action_pk} has {count} related resource types, RBAC actions need exactly one")]
    #[diagnostic(
        code(policyhub::authz::invalid_action_resource_types),
        help("Fix the action model so it relates to a single resource type before granting it to groups")
    )]
    InvalidActionResourceTypes { action_pk: i64, count: usize },

    #[error("metadata lookup `{lookup}` failed")]
    #[diagnostic(code(policyhub::authz::lookup))]
    Lookup {
        lookup: String,
        #[source]
        source: LookupError,
    },

    #[error("bad request: {0}")]
    #[diagnostic(code(policyhub::authz::validation))]
    Validation(String),

    #[error("unsupported policy type `{0}`")]
    #[diagnostic(
        code(policyhub::authz::unsupported_policy_type),
        help("Supported types: abac, rbac")
    )]
    UnsupportedPolicyType(String),

    #[error("policy expression is invalid: {0}")]
    #[diagnostic(code(policyhub::authz::invalid_expression))]
    InvalidExpression(String),

    #[error(transparent)]
    #[diagnostic(code(policyhub::authz::storage))]
    Storage(#[from] HubError),

    #[error("expression serialization failed: {0}")]
    #[diagnostic(code(policyhub::authz::serialization))]
    Serialization(#[from] serde_json::Error),
}

impl From<sea_orm::DbErr> for AuthzError {
    fn from(err: sea_orm::DbErr) -> Self {
        AuthzError::Storage(HubError::Db(err))
    }
}

impl From<LookupError> for AuthzError {
    fn from(source: LookupError) -> Self {
        AuthzError::Lookup {
            lookup: source.key().to_string(),
            source,
        }
    }
}

impl AuthzError {
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AuthzError::Validation(_) | AuthzError::UnsupportedPolicyType(_)
        )
    }
}

impl IntoResponse for AuthzError {
    fn into_response(self) -> Response {
        let (status, code) = if self.is_client_error() {
            (StatusCode::BAD_REQUEST, CODE_BAD_REQUEST)
        } else {
            tracing::error!(error = %self, "engine request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, CODE_SYSTEM_ERROR)
        };
        let body = json!({ "code": code, "message": self.to_string(), "data": {} });
        (status, Json(body)).into_response()
    }
}
