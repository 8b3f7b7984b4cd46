use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Resource types an action relates to. RBAC-compilable actions have exactly one.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "action_resource_types")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = true)]
    pub pk: i64,
    pub action_system: String,
    pub action_id: String,
    pub resource_type_system: String,
    pub resource_type_id: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
