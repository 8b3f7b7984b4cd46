use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::authz::errors::AuthzError;

/// 2100-01-01T00:00:00Z, the expiry of grants that never expire.
pub const NEVER_EXPIRED_AT: i64 = 4_102_444_800;

/// Expression pk of ABAC policies granting any instance.
pub const ANY_EXPRESSION_PK: i64 = -1;

pub const IAM_PATH_ATTRIBUTE: &str = "_bk_iam_path_";

pub const ENGINE_POLICY_VERSION: &str = "1";

pub const CODE_OK: i64 = 0;
pub const CODE_BAD_REQUEST: i64 = 1_901_400;
pub const CODE_SYSTEM_ERROR: i64 = 1_901_500;

/// Action metadata as the compiler needs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub pk: i64,
    pub system: String,
    pub id: String,
}

/// "system/id" pair of a resource type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceTypeRef {
    pub system: String,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceType {
    pub pk: i64,
    pub system: String,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDetail {
    pub pk: i64,
    pub resource_types: Vec<ResourceTypeRef>,
}

/// resource type pk -> resource ids
pub type ResourceMap = BTreeMap<i64, Vec<String>>;

/// One group's grant to a subject for an action.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GroupResourceGrant {
    pub expired_at: i64,
    #[serde(default)]
    pub resources: ResourceMap,
}

/// All group grants a subject holds for one action, keyed by group pk.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubjectActionGroupResource {
    pub subject_pk: i64,
    pub action_pk: i64,
    pub group_resource: BTreeMap<i64, GroupResourceGrant>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectActionExpression {
    pub subject_pk: i64,
    pub action_pk: i64,
    pub expression: String,
    pub expired_at: i64,
}

impl SubjectActionExpression {
    pub fn empty(subject_pk: i64, action_pk: i64) -> Self {
        Self {
            subject_pk,
            action_pk,
            expression: "{}".to_string(),
            expired_at: 0,
        }
    }
}

/// Result of compiling a subject/action pair. `NoGrants` is not a failure: the
/// pair legitimately grants nothing and carries the empty expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompileOutcome {
    Compiled(SubjectActionExpression),
    NoGrants(SubjectActionExpression),
}

impl CompileOutcome {
    pub fn expression(&self) -> &SubjectActionExpression {
        match self {
            CompileOutcome::Compiled(e) | CompileOutcome::NoGrants(e) => e,
        }
    }

    pub fn into_expression(self) -> SubjectActionExpression {
        match self {
            CompileOutcome::Compiled(e) | CompileOutcome::NoGrants(e) => e,
        }
    }

    pub fn is_no_grants(&self) -> bool {
        matches!(self, CompileOutcome::NoGrants(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyType {
    #[default]
    Abac,
    Rbac,
}

impl PolicyType {
    /// Missing or empty means ABAC.
    pub fn parse_optional(raw: Option<&str>) -> Result<Self, AuthzError> {
        match raw {
            None | Some("") => Ok(PolicyType::Abac),
            Some(s) => s.parse(),
        }
    }
}

impl FromStr for PolicyType {
    type Err = AuthzError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "abac" => Ok(PolicyType::Abac),
            "rbac" => Ok(PolicyType::Rbac),
            other => Err(AuthzError::UnsupportedPolicyType(other.to_string())),
        }
    }
}

impl fmt::Display for PolicyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyType::Abac => write!(f, "abac"),
            PolicyType::Rbac => write!(f, "rbac"),
        }
    }
}

/// ABAC policy row as read for engines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbacPolicy {
    pub pk: i64,
    pub subject_pk: i64,
    pub action_pk: i64,
    pub expression_pk: i64,
    pub template_id: i64,
    pub expired_at: i64,
    pub updated_at: i64,
}

/// RBAC group/resource policy row as read for engines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RbacPolicy {
    pub pk: i64,
    pub group_pk: i64,
    pub template_id: i64,
    pub system: String,
    pub action_pks: Vec<i64>,
    pub action_related_resource_type_pk: i64,
    pub resource_type_pk: i64,
    pub resource_id: String,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    #[serde(rename = "type")]
    pub subject_type: String,
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyAction {
    pub id: String,
}

/// Policy record as consumed by engines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnginePolicy {
    pub version: String,
    pub id: i64,
    #[serde(rename = "type")]
    pub policy_type: PolicyType,
    pub system: String,
    pub actions: Vec<PolicyAction>,
    pub subject: Subject,
    pub expression: serde_json::Value,
    pub template_id: i64,
    pub expired_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListPolicyQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub policy_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListPolicyIdsQuery {
    #[serde(default)]
    pub begin_updated_at: i64,
    #[serde(default)]
    pub end_updated_at: i64,
    #[serde(rename = "type", default)]
    pub policy_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaxPolicyIdQuery {
    #[serde(default)]
    pub updated_at: i64,
    #[serde(rename = "type", default)]
    pub policy_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyListResponse {
    pub metadata: ListPolicyQuery,
    pub results: Vec<EnginePolicy>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyIdsResponse {
    pub ids: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaxPolicyIdResponse {
    pub id: i64,
}

/// `{code, message, data}` wrapper around every engine API answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: i64,
    pub message: String,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            code: CODE_OK,
            message: "ok".to_string(),
            data,
        }
    }
}
