//! Compiles a subject's RBAC group grants for one action into a single ABAC
//! expression.
//!
//! Native resource type grants become a `StringEquals` clause on `.id`,
//! grants on any other type become a `StringContains` clause on the
//! `_bk_iam_path_` attribute. A lone clause is emitted as-is, two or more
//! are wrapped in `{"OR": {"content": [...]}}`.

use serde_json::{json, Value};

use crate::authz::aggregate::merge_group_resources;
use crate::authz::cache::{MetadataCache, MetadataSource};
use crate::authz::errors::AuthzError;
use crate::authz::resolver::{path_fragment, resolve_action_scope, ResourceMatch};
use crate::authz::types::{
    CompileOutcome, ResourceMap, SubjectActionExpression, SubjectActionGroupResource,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clause {
    StringEquals { key: String, values: Vec<String> },
    StringContains { key: String, values: Vec<String> },
}

impl Clause {
    pub fn to_value(&self) -> Value {
        match self {
            Clause::StringEquals { key, values } => json!({ "StringEquals": { key: values } }),
            Clause::StringContains { key, values } => json!({ "StringContains": { key: values } }),
        }
    }
}

/// Single clause passes through unwrapped.
pub fn combine_clauses(clauses: &[Clause]) -> Value {
    match clauses {
        [] => json!({}),
        [single] => single.to_value(),
        many => json!({
            "OR": { "content": many.iter().map(Clause::to_value).collect::<Vec<_>>() }
        }),
    }
}

/// One clause per resource type in `resources`, in map order.
pub async fn build_clauses<S: MetadataSource>(
    cache: &MetadataCache<S>,
    action_pk: i64,
    resources: &ResourceMap,
) -> Result<Vec<Clause>, AuthzError> {
    let scope = resolve_action_scope(cache, action_pk).await?;

    let mut clauses = Vec::with_capacity(resources.len());
    for (rt_pk, ids) in resources {
        let clause = match scope.classify(cache, *rt_pk).await? {
            ResourceMatch::Native => Clause::StringEquals {
                key: scope.id_attribute(),
                values: ids.clone(),
            },
            ResourceMatch::Ancestor(ancestor) => Clause::StringContains {
                key: scope.path_attribute(),
                values: ids.iter().map(|id| path_fragment(&ancestor.id, id)).collect(),
            },
        };
        clauses.push(clause);
    }
    Ok(clauses)
}

/// Compiles the grants of one subject/action pair as of `now`.
pub async fn compile<S: MetadataSource>(
    cache: &MetadataCache<S>,
    obj: &SubjectActionGroupResource,
    now: i64,
) -> Result<CompileOutcome, AuthzError> {
    let (min_expired_at, resources) = merge_group_resources(obj, now);
    if resources.is_empty() {
        return Ok(CompileOutcome::NoGrants(SubjectActionExpression::empty(
            obj.subject_pk,
            obj.action_pk,
        )));
    }

    let clauses = build_clauses(cache, obj.action_pk, &resources).await?;
    let expression = serde_json::to_string(&combine_clauses(&clauses))?;

    Ok(CompileOutcome::Compiled(SubjectActionExpression {
        subject_pk: obj.subject_pk,
        action_pk: obj.action_pk,
        expression,
        expired_at: min_expired_at,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::cache::testing::{cache_with, FakeSource};
    use crate::authz::types::GroupResourceGrant;

    const NOW: i64 = 1_700_000_000;

    fn source() -> FakeSource {
        let src = FakeSource::default();
        src.add_resource_type(1, "sys", "host");
        src.add_resource_type(2, "sys", "biz");
        src.add_action(10, "sys", "view_host", &[("sys", "host")]);
        src.add_action(11, "sys", "broken", &[("sys", "host"), ("sys", "biz")]);
        src
    }

    fn grant(expired_at: i64, resources: &[(i64, &[&str])]) -> GroupResourceGrant {
        GroupResourceGrant {
            expired_at,
            resources: resources
                .iter()
                .map(|(pk, ids)| (*pk, ids.iter().map(|s| s.to_string()).collect()))
                .collect(),
        }
    }

    fn record(action_pk: i64, grants: Vec<(i64, GroupResourceGrant)>) -> SubjectActionGroupResource {
        SubjectActionGroupResource {
            subject_pk: 1,
            action_pk,
            group_resource: grants.into_iter().collect(),
        }
    }

    fn parsed(outcome: &CompileOutcome) -> Value {
        serde_json::from_str(&outcome.expression().expression).unwrap()
    }

    #[tokio::test]
    async fn merges_native_grants_across_groups() {
        let cache = cache_with(source());
        let obj = record(
            10,
            vec![
                (1, grant(NOW + 100, &[(1, &["1", "2"])])),
                (2, grant(NOW + 50, &[(1, &["3"])])),
            ],
        );

        let outcome = compile(&cache, &obj, NOW).await.unwrap();
        assert!(!outcome.is_no_grants());
        assert_eq!(
            parsed(&outcome),
            json!({"StringEquals": {"sys.host.id": ["1", "2", "3"]}})
        );
        assert_eq!(outcome.expression().expired_at, NOW + 50);
    }

    #[tokio::test]
    async fn expired_group_is_ignored() {
        let cache = cache_with(source());
        let obj = record(
            10,
            vec![
                (1, grant(NOW + 100, &[(1, &["1", "2"])])),
                (2, grant(NOW - 1, &[(1, &["3"])])),
            ],
        );

        let outcome = compile(&cache, &obj, NOW).await.unwrap();
        assert_eq!(
            parsed(&outcome),
            json!({"StringEquals": {"sys.host.id": ["1", "2"]}})
        );
        assert_eq!(outcome.expression().expired_at, NOW + 100);
    }

    #[tokio::test]
    async fn ancestor_grant_becomes_path_clause() {
        let cache = cache_with(source());
        let obj = record(10, vec![(1, grant(NOW + 10, &[(2, &["5"])]))]);

        let outcome = compile(&cache, &obj, NOW).await.unwrap();
        assert_eq!(
            parsed(&outcome),
            json!({"StringContains": {"sys.host._bk_iam_path_": ["/biz,5/"]}})
        );
    }

    #[tokio::test]
    async fn ancestor_id_from_two_groups_is_kept_twice() {
        let cache = cache_with(source());
        let obj = record(
            10,
            vec![
                (1, grant(NOW + 10, &[(2, &["5"])])),
                (2, grant(NOW + 20, &[(2, &["5", "6"])])),
            ],
        );

        let outcome = compile(&cache, &obj, NOW).await.unwrap();
        assert_eq!(
            parsed(&outcome),
            json!({"StringContains": {"sys.host._bk_iam_path_": ["/biz,5/", "/biz,5/", "/biz,6/"]}})
        );
        assert_eq!(outcome.expression().expired_at, NOW + 10);
    }

    #[tokio::test]
    async fn mixed_grants_are_wrapped_in_or() {
        let cache = cache_with(source());
        let obj = record(10, vec![(1, grant(NOW + 10, &[(1, &["1"]), (2, &["5", "6"])]))]);

        let outcome = compile(&cache, &obj, NOW).await.unwrap();
        let value = parsed(&outcome);
        let content = value["OR"]["content"].as_array().unwrap();
        assert_eq!(content.len(), 2);
        assert!(content.contains(&json!({"StringEquals": {"sys.host.id": ["1"]}})));
        assert!(content.contains(
            &json!({"StringContains": {"sys.host._bk_iam_path_": ["/biz,5/", "/biz,6/"]}})
        ));
    }

    #[tokio::test]
    async fn no_grants_is_not_an_error() {
        let cache = cache_with(source());

        let outcome = compile(&cache, &record(10, vec![]), NOW).await.unwrap();
        assert!(outcome.is_no_grants());
        assert_eq!(outcome.expression().expression, "{}");
        assert_eq!(outcome.expression().expired_at, 0);

        let expired = record(10, vec![(1, grant(NOW - 10, &[(1, &["1"])]))]);
        let outcome = compile(&cache, &expired, NOW).await.unwrap();
        assert!(outcome.is_no_grants());
        // nothing to resolve, so metadata is never touched
        assert_eq!(cache.source().loads(), 0);
    }

    #[tokio::test]
    async fn action_with_two_resource_types_fails() {
        let cache = cache_with(source());
        let obj = record(11, vec![(1, grant(NOW + 10, &[(1, &["1"])]))]);

        match compile(&cache, &obj, NOW).await {
            Err(AuthzError::InvalidActionResourceTypes { action_pk, count }) => {
                assert_eq!(action_pk, 11);
                assert_eq!(count, 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn unresolvable_ancestor_fails_instead_of_dropping() {
        let cache = cache_with(source());
        let obj = record(10, vec![(1, grant(NOW + 10, &[(1, &["1"]), (77, &["x"])]))]);

        let err = compile(&cache, &obj, NOW).await.unwrap_err();
        assert!(matches!(err, AuthzError::Lookup { ref lookup, .. } if lookup == "resourcetype:pk:77"));
    }

    #[test]
    fn combine_wraps_only_multiple_clauses() {
        let eq = Clause::StringEquals {
            key: "s.h.id".into(),
            values: vec!["1".into()],
        };
        let contains = Clause::StringContains {
            key: "s.h._bk_iam_path_".into(),
            values: vec!["/b,1/".into()],
        };

        assert_eq!(combine_clauses(&[eq.clone()]), eq.to_value());
        let both = combine_clauses(&[eq.clone(), contains.clone()]);
        assert_eq!(
            both,
            json!({"OR": {"content": [eq.to_value(), contains.to_value()]}})
        );
    }
}
