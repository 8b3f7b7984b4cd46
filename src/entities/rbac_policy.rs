use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One group's grant on one resource instance for a set of actions.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "rbac_group_resource_policies")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = true)]
    pub pk: i64,
    pub group_pk: i64,
    pub template_id: i64,
    pub system: String,
    pub action_pks: String, // comma separated action pks
    pub action_related_resource_type_pk: i64,
    pub resource_type_pk: i64,
    pub resource_id: String,
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
