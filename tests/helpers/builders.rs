use policyhub::authz::types::GroupResourceGrant;
use policyhub::authz::pipeline::GroupGrantChange;
use policyhub::storage::{self, NewAbacPolicy, NewRbacPolicy};
use sea_orm::DatabaseConnection;

/// Builder for ABAC engine policies
pub struct AbacPolicyBuilder {
    subject_pk: i64,
    action_pk: i64,
    expression: Option<String>,
    template_id: i64,
    expired_at: i64,
    updated_at: i64,
}

impl AbacPolicyBuilder {
    pub fn new(subject_pk: i64, action_pk: i64) -> Self {
        Self {
            subject_pk,
            action_pk,
            expression: None,
            template_id: 0,
            expired_at: 4_102_444_800,
            updated_at: 1,
        }
    }

    pub fn with_expression(mut self, expression: &str) -> Self {
        self.expression = Some(expression.to_string());
        self
    }

    pub fn with_template(mut self, template_id: i64) -> Self {
        self.template_id = template_id;
        self
    }

    pub fn expires_at(mut self, expired_at: i64) -> Self {
        self.expired_at = expired_at;
        self
    }

    pub fn updated_at(mut self, updated_at: i64) -> Self {
        self.updated_at = updated_at;
        self
    }

    /// Without an expression the policy grants any instance.
    pub async fn create(self, db: &DatabaseConnection) -> i64 {
        let expression_pk = match &self.expression {
            Some(body) => storage::create_expression(db, body)
                .await
                .expect("Failed to create expression"),
            None => -1,
        };
        storage::create_abac_policy(
            db,
            NewAbacPolicy {
                subject_pk: self.subject_pk,
                action_pk: self.action_pk,
                expression_pk,
                template_id: self.template_id,
                expired_at: self.expired_at,
            },
            self.updated_at,
        )
        .await
        .expect("Failed to create abac policy")
    }
}

/// Builder for RBAC group/resource engine policies
pub struct RbacPolicyBuilder {
    group_pk: i64,
    action_pks: Vec<i64>,
    action_resource_type_pk: i64,
    resource_type_pk: i64,
    resource_id: String,
    updated_at: i64,
}

impl RbacPolicyBuilder {
    pub fn new(group_pk: i64, action_resource_type_pk: i64) -> Self {
        Self {
            group_pk,
            action_pks: Vec::new(),
            action_resource_type_pk,
            resource_type_pk: action_resource_type_pk,
            resource_id: "1".to_string(),
            updated_at: 1,
        }
    }

    pub fn with_action(mut self, action_pk: i64) -> Self {
        self.action_pks.push(action_pk);
        self
    }

    pub fn on_resource(mut self, resource_type_pk: i64, resource_id: &str) -> Self {
        self.resource_type_pk = resource_type_pk;
        self.resource_id = resource_id.to_string();
        self
    }

    pub fn updated_at(mut self, updated_at: i64) -> Self {
        self.updated_at = updated_at;
        self
    }

    pub async fn create(self, db: &DatabaseConnection) -> i64 {
        storage::create_rbac_policy(
            db,
            NewRbacPolicy {
                group_pk: self.group_pk,
                template_id: 0,
                system: "sys".to_string(),
                action_pks: self.action_pks,
                action_related_resource_type_pk: self.action_resource_type_pk,
                resource_type_pk: self.resource_type_pk,
                resource_id: self.resource_id,
            },
            self.updated_at,
        )
        .await
        .expect("Failed to create rbac policy")
    }
}

/// Builder for group grant changes
pub struct GrantBuilder {
    change: GroupGrantChange,
}

impl GrantBuilder {
    pub fn new(subject_pk: i64, action_pk: i64, group_pk: i64) -> Self {
        Self {
            change: GroupGrantChange {
                subject_pk,
                action_pk,
                group_pk,
                grant: None,
            },
        }
    }

    pub fn expires_at(mut self, expired_at: i64) -> Self {
        self.change
            .grant
            .get_or_insert_with(GroupResourceGrant::default)
            .expired_at = expired_at;
        self
    }

    pub fn resources(mut self, resource_type_pk: i64, ids: &[&str]) -> Self {
        self.change
            .grant
            .get_or_insert_with(GroupResourceGrant::default)
            .resources
            .entry(resource_type_pk)
            .or_default()
            .extend(ids.iter().map(|s| s.to_string()));
        self
    }

    /// Change without a grant revokes the group.
    pub fn build(self) -> GroupGrantChange {
        self.change
    }
}
