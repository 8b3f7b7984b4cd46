//! Keeps compiled subject/action expressions in step with group grants.
//!
//! Every change rewrites the stored group grants of one subject/action pair
//! and replaces its compiled expression in the same transaction. Work on a
//! pair is serialized from load to write. Batches isolate failures per pair.

use dashmap::DashMap;
use sea_orm::{DatabaseConnection, TransactionTrait};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::authz::cache::{MetadataCache, MetadataSource};
use crate::authz::compiler;
use crate::authz::errors::AuthzError;
use crate::authz::types::{
    CompileOutcome, GroupResourceGrant, ResourceTypeRef, SubjectActionGroupResource,
};
use crate::errors::HubError;
use crate::storage;

/// Grant (`Some`) or revoke (`None`) one group's resources for a subject/action pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupGrantChange {
    pub subject_pk: i64,
    pub action_pk: i64,
    pub group_pk: i64,
    pub grant: Option<GroupResourceGrant>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecompileFailure {
    pub subject_pk: i64,
    pub action_pk: i64,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecompileReport {
    pub succeeded: usize,
    pub no_grants: usize,
    pub failed: Vec<RecompileFailure>,
}

impl RecompileReport {
    pub fn processed(&self) -> usize {
        self.succeeded + self.no_grants + self.failed.len()
    }

    /// Pairs whose expression was rewritten.
    pub fn refreshed(&self) -> usize {
        self.succeeded + self.no_grants
    }

    fn record(&mut self, subject_pk: i64, action_pk: i64, result: Result<CompileOutcome, AuthzError>) {
        match result {
            Ok(CompileOutcome::Compiled(_)) => self.succeeded += 1,
            Ok(CompileOutcome::NoGrants(_)) => self.no_grants += 1,
            Err(e) => {
                tracing::error!(subject_pk, action_pk, error = %e, "expression compilation failed");
                self.failed.push(RecompileFailure {
                    subject_pk,
                    action_pk,
                    message: e.to_string(),
                });
            }
        }
    }
}

type PairKey = (i64, i64);

/// Held while one subject/action pair is loaded, compiled and written.
/// Unused lock entries are dropped on release.
struct PairLock<'a> {
    locks: &'a DashMap<PairKey, Arc<Mutex<()>>>,
    key: PairKey,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for PairLock<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks
            .remove_if(&self.key, |_, lock| Arc::strong_count(lock) == 1);
    }
}

pub struct GrantPipeline<S> {
    db: DatabaseConnection,
    cache: Arc<MetadataCache<S>>,
    locks: DashMap<PairKey, Arc<Mutex<()>>>,
}

impl<S: MetadataSource> GrantPipeline<S> {
    pub fn new(db: DatabaseConnection, cache: Arc<MetadataCache<S>>) -> Self {
        Self {
            db,
            cache,
            locks: DashMap::new(),
        }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn cache(&self) -> &Arc<MetadataCache<S>> {
        &self.cache
    }

    async fn lock_pair(&self, subject_pk: i64, action_pk: i64) -> PairLock<'_> {
        let key = (subject_pk, action_pk);
        let lock = self.locks.entry(key).or_default().clone();
        let guard = lock.lock_owned().await;
        PairLock {
            locks: &self.locks,
            key,
            guard: Some(guard),
        }
    }

    async fn load_record(
        &self,
        subject_pk: i64,
        action_pk: i64,
    ) -> Result<SubjectActionGroupResource, HubError> {
        Ok(
            storage::get_subject_action_group_resource(&self.db, subject_pk, action_pk)
                .await?
                .unwrap_or(SubjectActionGroupResource {
                    subject_pk,
                    action_pk,
                    ..Default::default()
                }),
        )
    }

    /// Applies one grant change and stores the recompiled expression.
    ///
    /// The record and expression are only written when compilation succeeds.
    pub async fn apply_change(
        &self,
        change: GroupGrantChange,
        now: i64,
    ) -> Result<CompileOutcome, AuthzError> {
        let _lock = self.lock_pair(change.subject_pk, change.action_pk).await;

        let mut record = self.load_record(change.subject_pk, change.action_pk).await?;
        match change.grant {
            Some(grant) => {
                record.group_resource.insert(change.group_pk, grant);
            }
            None => {
                record.group_resource.remove(&change.group_pk);
            }
        }

        let outcome = compiler::compile(self.cache.as_ref(), &record, now).await?;

        let txn = self.db.begin().await?;
        storage::save_subject_action_group_resource(&txn, &record).await?;
        storage::upsert_subject_action_expression(&txn, outcome.expression()).await?;
        txn.commit().await?;

        tracing::debug!(
            subject_pk = change.subject_pk,
            action_pk = change.action_pk,
            group_pk = change.group_pk,
            no_grants = outcome.is_no_grants(),
            "group grant applied"
        );
        Ok(outcome)
    }

    /// Recompiles a pair from its stored grants without changing them.
    pub async fn recompile(
        &self,
        subject_pk: i64,
        action_pk: i64,
        now: i64,
    ) -> Result<CompileOutcome, AuthzError> {
        let _lock = self.lock_pair(subject_pk, action_pk).await;

        let record = self.load_record(subject_pk, action_pk).await?;
        let outcome = compiler::compile(self.cache.as_ref(), &record, now).await?;
        storage::upsert_subject_action_expression(&self.db, outcome.expression()).await?;
        Ok(outcome)
    }

    pub async fn apply_changes(&self, changes: Vec<GroupGrantChange>, now: i64) -> RecompileReport {
        let mut report = RecompileReport::default();
        for change in changes {
            let (subject_pk, action_pk) = (change.subject_pk, change.action_pk);
            let result = self.apply_change(change, now).await;
            report.record(subject_pk, action_pk, result);
        }
        tracing::info!(
            succeeded = report.succeeded,
            no_grants = report.no_grants,
            failed = report.failed.len(),
            "group grant changes applied"
        );
        report
    }

    /// Rewrites up to `limit` pairs whose expression expired before `now`.
    ///
    /// Pairs that fail to compile keep their old expiry, so the scan pages
    /// past them instead of retrying the same head of the queue.
    pub async fn refresh_expired(&self, now: i64, limit: u64) -> Result<RecompileReport, HubError> {
        let mut report = RecompileReport::default();
        let mut cursor = None;

        while (report.refreshed() as u64) < limit {
            let wanted = limit - report.refreshed() as u64;
            let page = storage::list_expired_subject_actions(&self.db, now, cursor, wanted).await?;
            let Some(last) = page.last() else {
                break;
            };
            cursor = Some(last.cursor());
            let exhausted = (page.len() as u64) < wanted;

            for expired in page {
                let result = self.recompile(expired.subject_pk, expired.action_pk, now).await;
                report.record(expired.subject_pk, expired.action_pk, result);
            }
            if exhausted {
                break;
            }
        }
        Ok(report)
    }

    /// Replaces an action's related resource types and drops its cached metadata.
    pub async fn update_action_resource_types(
        &self,
        system: &str,
        action_id: &str,
        related: &[ResourceTypeRef],
    ) -> Result<(), HubError> {
        storage::set_action_resource_types(&self.db, system, action_id, related).await?;
        self.cache.invalidate_action(system, action_id);
        Ok(())
    }
}
