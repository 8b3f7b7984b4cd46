use crate::authz::cache::MetadataSource;
use crate::authz::types::{
    AbacPolicy, Action, ActionDetail, GroupResourceGrant, RbacPolicy, ResourceType,
    ResourceTypeRef, Subject, SubjectActionExpression, SubjectActionGroupResource,
};
use crate::entities;
use crate::errors::HubError;
use crate::settings::Database as DbCfg;
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, Database, DatabaseConnection,
    EntityTrait, NotSet, QueryFilter, QueryOrder, QuerySelect, Set,
};
use std::collections::{BTreeMap, HashMap};

pub async fn init(cfg: &DbCfg) -> Result<DatabaseConnection, HubError> {
    let db = Database::connect(&cfg.url).await?;
    Ok(db)
}

// ============================================================================
// Model metadata
// ============================================================================

pub async fn create_resource_type(
    db: &DatabaseConnection,
    system: &str,
    id: &str,
    name: &str,
) -> Result<i64, HubError> {
    let model = entities::resource_type::ActiveModel {
        pk: NotSet,
        system: Set(system.to_string()),
        id: Set(id.to_string()),
        name: Set(name.to_string()),
    }
    .insert(db)
    .await?;
    Ok(model.pk)
}

pub async fn create_action(
    db: &DatabaseConnection,
    system: &str,
    id: &str,
    name: &str,
    related: &[ResourceTypeRef],
) -> Result<i64, HubError> {
    let model = entities::action::ActiveModel {
        pk: NotSet,
        system: Set(system.to_string()),
        id: Set(id.to_string()),
        name: Set(name.to_string()),
    }
    .insert(db)
    .await?;

    set_action_resource_types(db, system, id, related).await?;
    Ok(model.pk)
}

/// Replaces the related resource types of an action.
pub async fn set_action_resource_types(
    db: &DatabaseConnection,
    system: &str,
    action_id: &str,
    related: &[ResourceTypeRef],
) -> Result<(), HubError> {
    use entities::action_resource_type::{ActiveModel, Column, Entity};

    Entity::delete_many()
        .filter(Column::ActionSystem.eq(system))
        .filter(Column::ActionId.eq(action_id))
        .exec(db)
        .await?;

    for rt in related {
        ActiveModel {
            pk: NotSet,
            action_system: Set(system.to_string()),
            action_id: Set(action_id.to_string()),
            resource_type_system: Set(rt.system.clone()),
            resource_type_id: Set(rt.id.clone()),
        }
        .insert(db)
        .await?;
    }
    Ok(())
}

pub async fn get_action_by_pk(db: &DatabaseConnection, pk: i64) -> Result<Option<Action>, HubError> {
    let model = entities::Action::find_by_id(pk).one(db).await?;
    Ok(model.map(|m| Action {
        pk: m.pk,
        system: m.system,
        id: m.id,
    }))
}

pub async fn get_action_detail(
    db: &DatabaseConnection,
    system: &str,
    action_id: &str,
) -> Result<Option<ActionDetail>, HubError> {
    use entities::action::Column;

    let Some(action) = entities::Action::find()
        .filter(Column::System.eq(system))
        .filter(Column::Id.eq(action_id))
        .one(db)
        .await?
    else {
        return Ok(None);
    };

    let related = {
        use entities::action_resource_type::Column;
        entities::ActionResourceType::find()
            .filter(Column::ActionSystem.eq(system))
            .filter(Column::ActionId.eq(action_id))
            .order_by_asc(Column::Pk)
            .all(db)
            .await?
    };

    Ok(Some(ActionDetail {
        pk: action.pk,
        resource_types: related
            .into_iter()
            .map(|m| ResourceTypeRef {
                system: m.resource_type_system,
                id: m.resource_type_id,
            })
            .collect(),
    }))
}

pub async fn get_resource_type_pk(
    db: &DatabaseConnection,
    system: &str,
    id: &str,
) -> Result<Option<i64>, HubError> {
    use entities::resource_type::Column;

    let model = entities::ResourceType::find()
        .filter(Column::System.eq(system))
        .filter(Column::Id.eq(id))
        .one(db)
        .await?;
    Ok(model.map(|m| m.pk))
}

pub async fn get_resource_type_by_pk(
    db: &DatabaseConnection,
    pk: i64,
) -> Result<Option<ResourceType>, HubError> {
    let model = entities::ResourceType::find_by_id(pk).one(db).await?;
    Ok(model.map(|m| ResourceType {
        pk: m.pk,
        system: m.system,
        id: m.id,
    }))
}

/// [`MetadataSource`] reading straight from the database.
#[derive(Debug, Clone)]
pub struct DbMetadataSource {
    db: DatabaseConnection,
}

impl DbMetadataSource {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MetadataSource for DbMetadataSource {
    async fn action_by_pk(&self, pk: i64) -> Result<Option<Action>, HubError> {
        get_action_by_pk(&self.db, pk).await
    }

    async fn action_detail(
        &self,
        system: &str,
        action_id: &str,
    ) -> Result<Option<ActionDetail>, HubError> {
        get_action_detail(&self.db, system, action_id).await
    }

    async fn resource_type_pk(&self, system: &str, id: &str) -> Result<Option<i64>, HubError> {
        get_resource_type_pk(&self.db, system, id).await
    }

    async fn resource_type_by_pk(&self, pk: i64) -> Result<Option<ResourceType>, HubError> {
        get_resource_type_by_pk(&self.db, pk).await
    }
}

// ============================================================================
// Subjects and expressions
// ============================================================================

pub async fn create_subject(
    db: &DatabaseConnection,
    subject_type: &str,
    id: &str,
    name: &str,
) -> Result<i64, HubError> {
    let model = entities::subject::ActiveModel {
        pk: NotSet,
        subject_type: Set(subject_type.to_string()),
        id: Set(id.to_string()),
        name: Set(name.to_string()),
    }
    .insert(db)
    .await?;
    Ok(model.pk)
}

pub async fn get_subjects_by_pks(
    db: &DatabaseConnection,
    pks: &[i64],
) -> Result<HashMap<i64, Subject>, HubError> {
    use entities::subject::Column;

    if pks.is_empty() {
        return Ok(HashMap::new());
    }
    let models = entities::Subject::find()
        .filter(Column::Pk.is_in(pks.iter().copied()))
        .all(db)
        .await?;

    Ok(models
        .into_iter()
        .map(|m| {
            (
                m.pk,
                Subject {
                    subject_type: m.subject_type,
                    id: m.id,
                    name: m.name,
                },
            )
        })
        .collect())
}

pub async fn create_expression(db: &DatabaseConnection, expression: &str) -> Result<i64, HubError> {
    let model = entities::expression::ActiveModel {
        pk: NotSet,
        expression: Set(expression.to_string()),
    }
    .insert(db)
    .await?;
    Ok(model.pk)
}

pub async fn get_expressions_by_pks(
    db: &DatabaseConnection,
    pks: &[i64],
) -> Result<HashMap<i64, String>, HubError> {
    use entities::expression::Column;

    if pks.is_empty() {
        return Ok(HashMap::new());
    }
    let models = entities::Expression::find()
        .filter(Column::Pk.is_in(pks.iter().copied()))
        .all(db)
        .await?;
    Ok(models.into_iter().map(|m| (m.pk, m.expression)).collect())
}

// ============================================================================
// Engine policies
// ============================================================================

#[derive(Debug, Clone)]
pub struct NewAbacPolicy {
    pub subject_pk: i64,
    pub action_pk: i64,
    pub expression_pk: i64,
    pub template_id: i64,
    pub expired_at: i64,
}

pub async fn create_abac_policy(
    db: &DatabaseConnection,
    input: NewAbacPolicy,
    updated_at: i64,
) -> Result<i64, HubError> {
    let model = entities::policy::ActiveModel {
        pk: NotSet,
        subject_pk: Set(input.subject_pk),
        action_pk: Set(input.action_pk),
        expression_pk: Set(input.expression_pk),
        template_id: Set(input.template_id),
        expired_at: Set(input.expired_at),
        updated_at: Set(updated_at),
    }
    .insert(db)
    .await?;
    Ok(model.pk)
}

#[derive(Debug, Clone)]
pub struct NewRbacPolicy {
    pub group_pk: i64,
    pub template_id: i64,
    pub system: String,
    pub action_pks: Vec<i64>,
    pub action_related_resource_type_pk: i64,
    pub resource_type_pk: i64,
    pub resource_id: String,
}

pub async fn create_rbac_policy(
    db: &DatabaseConnection,
    input: NewRbacPolicy,
    updated_at: i64,
) -> Result<i64, HubError> {
    let action_pks = input
        .action_pks
        .iter()
        .map(|pk| pk.to_string())
        .collect::<Vec<_>>()
        .join(",");

    let model = entities::rbac_policy::ActiveModel {
        pk: NotSet,
        group_pk: Set(input.group_pk),
        template_id: Set(input.template_id),
        system: Set(input.system),
        action_pks: Set(action_pks),
        action_related_resource_type_pk: Set(input.action_related_resource_type_pk),
        resource_type_pk: Set(input.resource_type_pk),
        resource_id: Set(input.resource_id),
        updated_at: Set(updated_at),
    }
    .insert(db)
    .await?;
    Ok(model.pk)
}

fn abac_from_model(m: entities::policy::Model) -> AbacPolicy {
    AbacPolicy {
        pk: m.pk,
        subject_pk: m.subject_pk,
        action_pk: m.action_pk,
        expression_pk: m.expression_pk,
        template_id: m.template_id,
        expired_at: m.expired_at,
        updated_at: m.updated_at,
    }
}

fn rbac_from_model(m: entities::rbac_policy::Model) -> Result<RbacPolicy, HubError> {
    let action_pks = m
        .action_pks
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>().map_err(|_| {
                HubError::Other(format!(
                    "rbac policy pk={} has malformed action_pks `{}`",
                    m.pk, m.action_pks
                ))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RbacPolicy {
        pk: m.pk,
        group_pk: m.group_pk,
        template_id: m.template_id,
        system: m.system,
        action_pks,
        action_related_resource_type_pk: m.action_related_resource_type_pk,
        resource_type_pk: m.resource_type_pk,
        resource_id: m.resource_id,
        updated_at: m.updated_at,
    })
}

pub async fn list_abac_policies_by_pks(
    db: &DatabaseConnection,
    pks: &[i64],
) -> Result<Vec<AbacPolicy>, HubError> {
    use entities::policy::Column;

    if pks.is_empty() {
        return Ok(Vec::new());
    }
    let models = entities::Policy::find()
        .filter(Column::Pk.is_in(pks.iter().copied()))
        .all(db)
        .await?;
    Ok(models.into_iter().map(abac_from_model).collect())
}

/// ABAC policies with `expired_at > expired_after` and pk in `[min_pk, max_pk]`.
pub async fn list_abac_policies_between_pk(
    db: &DatabaseConnection,
    expired_after: i64,
    min_pk: i64,
    max_pk: i64,
) -> Result<Vec<AbacPolicy>, HubError> {
    use entities::policy::Column;

    let models = entities::Policy::find()
        .filter(Column::ExpiredAt.gt(expired_after))
        .filter(Column::Pk.between(min_pk, max_pk))
        .order_by_asc(Column::Pk)
        .all(db)
        .await?;
    Ok(models.into_iter().map(abac_from_model).collect())
}

pub async fn list_abac_policy_pks_between_updated_at(
    db: &DatabaseConnection,
    begin: i64,
    end: i64,
) -> Result<Vec<i64>, HubError> {
    use entities::policy::Column;

    let pks = entities::Policy::find()
        .select_only()
        .column(Column::Pk)
        .filter(Column::UpdatedAt.between(begin, end))
        .order_by_asc(Column::Pk)
        .into_tuple::<i64>()
        .all(db)
        .await?;
    Ok(pks)
}

/// Highest ABAC policy pk with `updated_at <= updated_at`, `0` when none.
pub async fn max_abac_policy_pk_before_updated_at(
    db: &DatabaseConnection,
    updated_at: i64,
) -> Result<i64, HubError> {
    use entities::policy::Column;

    let max = entities::Policy::find()
        .select_only()
        .column_as(Column::Pk.max(), "max_pk")
        .filter(Column::UpdatedAt.lte(updated_at))
        .into_tuple::<Option<i64>>()
        .one(db)
        .await?;
    Ok(max.flatten().unwrap_or(0))
}

pub async fn list_rbac_policies_by_pks(
    db: &DatabaseConnection,
    pks: &[i64],
) -> Result<Vec<RbacPolicy>, HubError> {
    use entities::rbac_policy::Column;

    if pks.is_empty() {
        return Ok(Vec::new());
    }
    let models = entities::RbacPolicy::find()
        .filter(Column::Pk.is_in(pks.iter().copied()))
        .all(db)
        .await?;
    models.into_iter().map(rbac_from_model).collect()
}

pub async fn list_rbac_policies_between_pk(
    db: &DatabaseConnection,
    min_pk: i64,
    max_pk: i64,
) -> Result<Vec<RbacPolicy>, HubError> {
    use entities::rbac_policy::Column;

    let models = entities::RbacPolicy::find()
        .filter(Column::Pk.between(min_pk, max_pk))
        .order_by_asc(Column::Pk)
        .all(db)
        .await?;
    models.into_iter().map(rbac_from_model).collect()
}

pub async fn list_rbac_policy_pks_between_updated_at(
    db: &DatabaseConnection,
    begin: i64,
    end: i64,
) -> Result<Vec<i64>, HubError> {
    use entities::rbac_policy::Column;

    let pks = entities::RbacPolicy::find()
        .select_only()
        .column(Column::Pk)
        .filter(Column::UpdatedAt.between(begin, end))
        .order_by_asc(Column::Pk)
        .into_tuple::<i64>()
        .all(db)
        .await?;
    Ok(pks)
}

pub async fn max_rbac_policy_pk_before_updated_at(
    db: &DatabaseConnection,
    updated_at: i64,
) -> Result<i64, HubError> {
    use entities::rbac_policy::Column;

    let max = entities::RbacPolicy::find()
        .select_only()
        .column_as(Column::Pk.max(), "max_pk")
        .filter(Column::UpdatedAt.lte(updated_at))
        .into_tuple::<Option<i64>>()
        .one(db)
        .await?;
    Ok(max.flatten().unwrap_or(0))
}

// ============================================================================
// Subject/action group grants and compiled expressions
// ============================================================================

pub async fn get_subject_action_group_resource(
    db: &DatabaseConnection,
    subject_pk: i64,
    action_pk: i64,
) -> Result<Option<SubjectActionGroupResource>, HubError> {
    use entities::subject_action_group_resource::Column;

    let Some(model) = entities::SubjectActionGroupResource::find()
        .filter(Column::SubjectPk.eq(subject_pk))
        .filter(Column::ActionPk.eq(action_pk))
        .one(db)
        .await?
    else {
        return Ok(None);
    };

    let group_resource: BTreeMap<i64, GroupResourceGrant> =
        serde_json::from_str(&model.group_resource)?;
    Ok(Some(SubjectActionGroupResource {
        subject_pk,
        action_pk,
        group_resource,
    }))
}

pub async fn save_subject_action_group_resource<C: ConnectionTrait>(
    conn: &C,
    record: &SubjectActionGroupResource,
) -> Result<(), HubError> {
    use entities::subject_action_group_resource::{ActiveModel, Column, Entity};

    let json = serde_json::to_string(&record.group_resource)?;
    let model = ActiveModel {
        pk: NotSet,
        subject_pk: Set(record.subject_pk),
        action_pk: Set(record.action_pk),
        group_resource: Set(json),
    };

    Entity::insert(model)
        .on_conflict(
            OnConflict::columns([Column::SubjectPk, Column::ActionPk])
                .update_column(Column::GroupResource)
                .to_owned(),
        )
        .exec(conn)
        .await?;
    Ok(())
}

/// Inserts or replaces the compiled expression of a subject/action pair.
pub async fn upsert_subject_action_expression<C: ConnectionTrait>(
    conn: &C,
    expr: &SubjectActionExpression,
) -> Result<(), HubError> {
    use entities::subject_action_expression::{ActiveModel, Column, Entity};

    let now = Utc::now().timestamp();
    let model = ActiveModel {
        pk: NotSet,
        subject_pk: Set(expr.subject_pk),
        action_pk: Set(expr.action_pk),
        expression: Set(expr.expression.clone()),
        expired_at: Set(expr.expired_at),
        updated_at: Set(now),
    };

    Entity::insert(model)
        .on_conflict(
            OnConflict::columns([Column::SubjectPk, Column::ActionPk])
                .update_columns([Column::Expression, Column::ExpiredAt, Column::UpdatedAt])
                .to_owned(),
        )
        .exec(conn)
        .await?;
    Ok(())
}

pub async fn get_subject_action_expression(
    db: &DatabaseConnection,
    subject_pk: i64,
    action_pk: i64,
) -> Result<Option<SubjectActionExpression>, HubError> {
    use entities::subject_action_expression::Column;

    let model = entities::SubjectActionExpression::find()
        .filter(Column::SubjectPk.eq(subject_pk))
        .filter(Column::ActionPk.eq(action_pk))
        .one(db)
        .await?;
    Ok(model.map(|m| SubjectActionExpression {
        subject_pk: m.subject_pk,
        action_pk: m.action_pk,
        expression: m.expression,
        expired_at: m.expired_at,
    }))
}

/// Expired compiled expression, keyed by its row for cursor paging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiredSubjectAction {
    pub pk: i64,
    pub subject_pk: i64,
    pub action_pk: i64,
    pub expired_at: i64,
}

impl ExpiredSubjectAction {
    pub fn cursor(&self) -> (i64, i64) {
        (self.expired_at, self.pk)
    }
}

/// Expressions that expired before `now`, ordered by `(expired_at, pk)` and
/// starting strictly after `after` when given.
pub async fn list_expired_subject_actions(
    db: &DatabaseConnection,
    now: i64,
    after: Option<(i64, i64)>,
    limit: u64,
) -> Result<Vec<ExpiredSubjectAction>, HubError> {
    use entities::subject_action_expression::Column;

    let mut query = entities::SubjectActionExpression::find()
        .select_only()
        .column(Column::Pk)
        .column(Column::SubjectPk)
        .column(Column::ActionPk)
        .column(Column::ExpiredAt)
        .filter(Column::ExpiredAt.ne(0))
        .filter(Column::ExpiredAt.lt(now));
    if let Some((expired_at, pk)) = after {
        query = query.filter(
            Condition::any().add(Column::ExpiredAt.gt(expired_at)).add(
                Condition::all()
                    .add(Column::ExpiredAt.eq(expired_at))
                    .add(Column::Pk.gt(pk)),
            ),
        );
    }

    let rows = query
        .order_by_asc(Column::ExpiredAt)
        .order_by_asc(Column::Pk)
        .limit(limit)
        .into_tuple::<(i64, i64, i64, i64)>()
        .all(db)
        .await?;
    Ok(rows
        .into_iter()
        .map(|(pk, subject_pk, action_pk, expired_at)| ExpiredSubjectAction {
            pk,
            subject_pk,
            action_pk,
            expired_at,
        })
        .collect())
}
