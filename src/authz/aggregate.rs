use crate::authz::types::{ResourceMap, SubjectActionGroupResource, NEVER_EXPIRED_AT};

/// Merges the non-expired group grants of a subject/action pair.
///
/// Returns the earliest expiry among surviving grants together with the
/// resource ids they grant, grouped by resource type pk. A grant expiring
/// exactly at `now` still counts. Ids are concatenated across groups without
/// dedup. The expiry is only meaningful when the map is non-empty.
pub fn merge_group_resources(obj: &SubjectActionGroupResource, now: i64) -> (i64, ResourceMap) {
    let mut min_expired_at = NEVER_EXPIRED_AT;
    let mut resources = ResourceMap::new();

    for grant in obj.group_resource.values() {
        if grant.expired_at < now {
            continue;
        }
        min_expired_at = min_expired_at.min(grant.expired_at);

        for (rt_pk, ids) in &grant.resources {
            resources
                .entry(*rt_pk)
                .or_default()
                .extend(ids.iter().cloned());
        }
    }

    (min_expired_at, resources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::types::GroupResourceGrant;
    use std::collections::BTreeMap;

    fn grant(expired_at: i64, resources: &[(i64, &[&str])]) -> GroupResourceGrant {
        GroupResourceGrant {
            expired_at,
            resources: resources
                .iter()
                .map(|(pk, ids)| (*pk, ids.iter().map(|s| s.to_string()).collect()))
                .collect(),
        }
    }

    fn record(grants: Vec<(i64, GroupResourceGrant)>) -> SubjectActionGroupResource {
        SubjectActionGroupResource {
            subject_pk: 1,
            action_pk: 2,
            group_resource: grants.into_iter().collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn min_expiry_over_surviving_grants() {
        let now = 1000;
        let obj = record(vec![
            (1, grant(now + 100, &[(5, &["1", "2"])])),
            (2, grant(now + 50, &[(5, &["3"])])),
            (3, grant(now - 1, &[(5, &["9"])])),
        ]);

        let (expired_at, resources) = merge_group_resources(&obj, now);
        assert_eq!(expired_at, now + 50);
        assert_eq!(resources.get(&5).unwrap(), &vec!["1", "2", "3"]);
    }

    #[test]
    fn grant_expiring_now_is_kept() {
        let now = 1000;
        let obj = record(vec![(1, grant(now, &[(5, &["1"])]))]);

        let (expired_at, resources) = merge_group_resources(&obj, now);
        assert_eq!(expired_at, now);
        assert_eq!(resources.len(), 1);
    }

    #[test]
    fn duplicates_across_groups_are_concatenated() {
        let obj = record(vec![
            (1, grant(2000, &[(5, &["1"]), (6, &["a"])])),
            (2, grant(3000, &[(5, &["1"])])),
        ]);

        let (_, resources) = merge_group_resources(&obj, 1000);
        assert_eq!(resources.get(&5).unwrap(), &vec!["1", "1"]);
        assert_eq!(resources.get(&6).unwrap(), &vec!["a"]);
    }

    #[test]
    fn all_expired_or_empty_yields_empty_map() {
        let (expired_at, resources) = merge_group_resources(&record(vec![]), 1000);
        assert!(resources.is_empty());
        assert_eq!(expired_at, NEVER_EXPIRED_AT);

        let obj = record(vec![(1, grant(999, &[(5, &["1"])]))]);
        let (_, resources) = merge_group_resources(&obj, 1000);
        assert!(resources.is_empty());
    }
}
