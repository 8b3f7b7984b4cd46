use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// ABAC policy served to decision engines. `expression_pk = -1` is the "any" expression.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "policies")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = true)]
    pub pk: i64,
    pub subject_pk: i64,
    pub action_pk: i64,
    pub expression_pk: i64,
    pub template_id: i64,
    pub expired_at: i64,
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
