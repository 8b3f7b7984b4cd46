use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Compiled expression for a (subject, action). Replaced wholesale on every recompile.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "subject_action_expressions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = true)]
    pub pk: i64,
    pub subject_pk: i64,
    pub action_pk: i64,
    #[sea_orm(column_type = "Text")]
    pub expression: String,
    pub expired_at: i64,
    pub updated_at: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
