//! Pull protocol for external decision engines.
//!
//! Engines sync by explicit ids, by pk range, by an `updated_at` window, or
//! ask for the highest pk up to a watermark. Queries are validated before the
//! store is touched. Returned policies carry their own `expired_at` and the
//! caller re-checks validity.

use chrono::{Local, Timelike};
use sea_orm::DatabaseConnection;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::authz::cache::{MetadataCache, MetadataSource};
use crate::authz::errors::AuthzError;
use crate::authz::resolver::path_fragment;
use crate::authz::translate::{any_cell, translate_policy_expression};
use crate::authz::types::{
    AbacPolicy, EnginePolicy, ListPolicyIdsQuery, ListPolicyQuery, MaxPolicyIdQuery,
    PolicyAction, PolicyListResponse, PolicyType, RbacPolicy, ANY_EXPRESSION_PK,
    ENGINE_POLICY_VERSION, IAM_PATH_ATTRIBUTE, NEVER_EXPIRED_AT,
};
use crate::storage;

pub const MAX_QUERY_IDS: usize = 200;
pub const MAX_UPDATED_AT_WINDOW_SECS: i64 = 3600;
pub const MAX_TIMESTAMP_LAG_SECS: i64 = 86400;

/// Which policies a list request selects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicySelection {
    Ids(Vec<i64>),
    Range {
        min_pk: i64,
        max_pk: i64,
        /// Only ABAC policies expiring after this are returned.
        timestamp: i64,
    },
}

/// Unix time of today 00:00:00, local time.
pub fn today_start() -> i64 {
    let now = Local::now();
    now.timestamp() - i64::from(now.num_seconds_from_midnight())
}

fn parse_ids(raw: &str) -> Result<Vec<i64>, AuthzError> {
    let parts: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if parts.len() > MAX_QUERY_IDS {
        return Err(AuthzError::Validation(format!(
            "ids should be less than or equal to {}",
            MAX_QUERY_IDS
        )));
    }
    parts
        .into_iter()
        .map(|s| {
            s.parse::<i64>()
                .map_err(|_| AuthzError::Validation(format!("ids should be integers, got `{}`", s)))
        })
        .collect()
}

impl ListPolicyQuery {
    /// Validates the query against `today_start` and resolves what to load.
    ///
    /// A non-empty `ids` takes priority over the pk range. The timestamp
    /// defaults to `today_start` and may lag it by at most one day.
    pub fn validate(&self, today_start: i64) -> Result<PolicySelection, AuthzError> {
        if let Some(raw) = self.ids.as_deref().filter(|s| !s.trim().is_empty()) {
            return Ok(PolicySelection::Ids(parse_ids(raw)?));
        }

        let min_pk = self.min_id.unwrap_or(0);
        let max_pk = self.max_id.unwrap_or(0);
        if min_pk <= 0 {
            return Err(AuthzError::Validation("min_id should be greater than 0".into()));
        }
        if max_pk <= 0 {
            return Err(AuthzError::Validation("max_id should be greater than 0".into()));
        }
        if min_pk > max_pk {
            return Err(AuthzError::Validation(
                "min_id should be less than or equal to max_id".into(),
            ));
        }

        let timestamp = match self.timestamp {
            None | Some(0) => today_start,
            Some(ts) if ts < 0 => {
                return Err(AuthzError::Validation("timestamp should be greater than 0".into()))
            }
            Some(ts) => {
                if today_start - ts > MAX_TIMESTAMP_LAG_SECS {
                    return Err(AuthzError::Validation(
                        "timestamp should not be more than 24 hours before today 00:00:00".into(),
                    ));
                }
                ts
            }
        };

        Ok(PolicySelection::Range {
            min_pk,
            max_pk,
            timestamp,
        })
    }
}

impl ListPolicyIdsQuery {
    pub fn validate(&self) -> Result<(), AuthzError> {
        if self.begin_updated_at <= 0 || self.end_updated_at <= 0 {
            return Err(AuthzError::Validation(
                "begin_updated_at and end_updated_at are required".into(),
            ));
        }
        if self.begin_updated_at >= self.end_updated_at {
            return Err(AuthzError::Validation(
                "begin_updated_at should be less than end_updated_at".into(),
            ));
        }
        if self.end_updated_at - self.begin_updated_at > MAX_UPDATED_AT_WINDOW_SECS {
            return Err(AuthzError::Validation(format!(
                "end_updated_at - begin_updated_at should be less than or equal to {}",
                MAX_UPDATED_AT_WINDOW_SECS
            )));
        }
        Ok(())
    }
}

impl MaxPolicyIdQuery {
    pub fn validate(&self) -> Result<(), AuthzError> {
        if self.updated_at <= 0 {
            return Err(AuthzError::Validation("updated_at is required".into()));
        }
        Ok(())
    }
}

/// Serves engine queries from the database, resolving action and resource
/// type metadata through the shared cache.
pub struct EngineService<S> {
    db: DatabaseConnection,
    cache: Arc<MetadataCache<S>>,
}

impl<S: MetadataSource> EngineService<S> {
    pub fn new(db: DatabaseConnection, cache: Arc<MetadataCache<S>>) -> Self {
        Self { db, cache }
    }

    pub fn cache(&self) -> &Arc<MetadataCache<S>> {
        &self.cache
    }

    pub async fn list_policies(
        &self,
        query: ListPolicyQuery,
        today_start: i64,
    ) -> Result<PolicyListResponse, AuthzError> {
        let policy_type = PolicyType::parse_optional(query.policy_type.as_deref())?;
        let selection = query.validate(today_start)?;

        let results = match policy_type {
            PolicyType::Abac => {
                let rows = match &selection {
                    PolicySelection::Ids(pks) => storage::list_abac_policies_by_pks(&self.db, pks).await?,
                    PolicySelection::Range {
                        min_pk,
                        max_pk,
                        timestamp,
                    } => {
                        storage::list_abac_policies_between_pk(&self.db, *timestamp, *min_pk, *max_pk)
                            .await?
                    }
                };
                self.convert_abac(rows).await?
            }
            PolicyType::Rbac => {
                let rows = match &selection {
                    PolicySelection::Ids(pks) => storage::list_rbac_policies_by_pks(&self.db, pks).await?,
                    PolicySelection::Range { min_pk, max_pk, .. } => {
                        storage::list_rbac_policies_between_pk(&self.db, *min_pk, *max_pk).await?
                    }
                };
                self.convert_rbac(rows).await?
            }
        };

        // echo the effective query
        let mut metadata = query;
        if let PolicySelection::Range { timestamp, .. } = selection {
            metadata.timestamp = Some(timestamp);
        }
        metadata.policy_type = Some(policy_type.to_string());

        tracing::debug!(count = results.len(), %policy_type, "engine policies listed");
        Ok(PolicyListResponse { metadata, results })
    }

    pub async fn list_policy_ids(&self, query: ListPolicyIdsQuery) -> Result<Vec<i64>, AuthzError> {
        let policy_type = PolicyType::parse_optional(query.policy_type.as_deref())?;
        query.validate()?;

        let ids = match policy_type {
            PolicyType::Abac => {
                storage::list_abac_policy_pks_between_updated_at(
                    &self.db,
                    query.begin_updated_at,
                    query.end_updated_at,
                )
                .await?
            }
            PolicyType::Rbac => {
                storage::list_rbac_policy_pks_between_updated_at(
                    &self.db,
                    query.begin_updated_at,
                    query.end_updated_at,
                )
                .await?
            }
        };
        Ok(ids)
    }

    pub async fn max_policy_id(&self, query: MaxPolicyIdQuery) -> Result<i64, AuthzError> {
        let policy_type = PolicyType::parse_optional(query.policy_type.as_deref())?;
        query.validate()?;

        let id = match policy_type {
            PolicyType::Abac => {
                storage::max_abac_policy_pk_before_updated_at(&self.db, query.updated_at).await?
            }
            PolicyType::Rbac => {
                storage::max_rbac_policy_pk_before_updated_at(&self.db, query.updated_at).await?
            }
        };
        Ok(id)
    }

    async fn convert_abac(&self, rows: Vec<AbacPolicy>) -> Result<Vec<EnginePolicy>, AuthzError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let subject_pks: Vec<i64> = distinct(rows.iter().map(|p| p.subject_pk));
        let expression_pks: Vec<i64> = distinct(
            rows.iter()
                .map(|p| p.expression_pk)
                .filter(|pk| *pk != ANY_EXPRESSION_PK),
        );
        let subjects = storage::get_subjects_by_pks(&self.db, &subject_pks).await?;
        let expressions = storage::get_expressions_by_pks(&self.db, &expression_pks).await?;

        let mut policies = Vec::with_capacity(rows.len());
        for row in rows {
            let expression = if row.expression_pk == ANY_EXPRESSION_PK {
                any_cell()
            } else {
                let Some(body) = expressions.get(&row.expression_pk) else {
                    tracing::error!(
                        policy_pk = row.pk,
                        expression_pk = row.expression_pk,
                        "policy expression missing, skipped"
                    );
                    continue;
                };
                translate_policy_expression(body)?
            };

            let Some(subject) = subjects.get(&row.subject_pk) else {
                tracing::info!(
                    policy_pk = row.pk,
                    subject_pk = row.subject_pk,
                    "policy subject missing, skipped"
                );
                continue;
            };

            let action = self.cache.action(row.action_pk).await?;

            policies.push(EnginePolicy {
                version: ENGINE_POLICY_VERSION.to_string(),
                id: row.pk,
                policy_type: PolicyType::Abac,
                system: action.system,
                actions: vec![PolicyAction { id: action.id }],
                subject: subject.clone(),
                expression,
                template_id: row.template_id,
                expired_at: row.expired_at,
                updated_at: row.updated_at,
            });
        }
        Ok(policies)
    }

    async fn convert_rbac(&self, rows: Vec<RbacPolicy>) -> Result<Vec<EnginePolicy>, AuthzError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let group_pks: Vec<i64> = distinct(rows.iter().map(|p| p.group_pk));
        let subjects = storage::get_subjects_by_pks(&self.db, &group_pks).await?;

        let mut policies = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(subject) = subjects.get(&row.group_pk) else {
                tracing::info!(
                    policy_pk = row.pk,
                    group_pk = row.group_pk,
                    "rbac policy group missing, skipped"
                );
                continue;
            };

            let mut actions = Vec::with_capacity(row.action_pks.len());
            for action_pk in &row.action_pks {
                let action = self.cache.action(*action_pk).await?;
                actions.push(PolicyAction { id: action.id });
            }

            let expression = match self.rbac_expression(&row).await {
                Ok(expression) => expression,
                Err(e) => {
                    tracing::error!(
                        policy_pk = row.pk,
                        resource_type_pk = row.resource_type_pk,
                        action_related_resource_type_pk = row.action_related_resource_type_pk,
                        error = %e,
                        "rbac policy condition unresolvable, skipped"
                    );
                    continue;
                }
            };

            policies.push(EnginePolicy {
                version: ENGINE_POLICY_VERSION.to_string(),
                id: row.pk,
                policy_type: PolicyType::Rbac,
                system: row.system.clone(),
                actions,
                subject: subject.clone(),
                expression,
                template_id: row.template_id,
                expired_at: NEVER_EXPIRED_AT,
                updated_at: row.updated_at,
            });
        }
        Ok(policies)
    }

    /// Single condition for one granted instance: equality when the instance
    /// is of the actions' related type, path containment otherwise.
    async fn rbac_expression(&self, row: &RbacPolicy) -> Result<Value, AuthzError> {
        let resource_type = self.cache.resource_type(row.resource_type_pk).await?;

        if row.resource_type_pk == row.action_related_resource_type_pk {
            return Ok(json!({
                "op": "eq",
                "field": format!("{}.id", resource_type.id),
                "value": row.resource_id,
            }));
        }

        let action_resource_type = self
            .cache
            .resource_type(row.action_related_resource_type_pk)
            .await?;
        Ok(json!({
            "op": "string_contains",
            "field": format!("{}.{}", action_resource_type.id, IAM_PATH_ATTRIBUTE),
            "value": path_fragment(&resource_type.id, &row.resource_id),
        }))
    }
}

fn distinct(pks: impl Iterator<Item = i64>) -> Vec<i64> {
    pks.collect::<BTreeSet<_>>().into_iter().collect()
}
