use sea_orm_migration::{prelude::*, schema::*};

use crate::pk_column;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Group grants per (subject, action), stored as a JSON document keyed by group pk
        manager
            .create_table(
                Table::create()
                    .table(SubjectActionGroupResources::Table)
                    .if_not_exists()
                    .col(pk_column(manager, SubjectActionGroupResources::Pk))
                    .col(big_integer(SubjectActionGroupResources::SubjectPk))
                    .col(big_integer(SubjectActionGroupResources::ActionPk))
                    .col(text(SubjectActionGroupResources::GroupResource))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_subject_action_group_resources_subject_action")
                    .table(SubjectActionGroupResources::Table)
                    .col(SubjectActionGroupResources::SubjectPk)
                    .col(SubjectActionGroupResources::ActionPk)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(SubjectActionExpressions::Table)
                    .if_not_exists()
                    .col(pk_column(manager, SubjectActionExpressions::Pk))
                    .col(big_integer(SubjectActionExpressions::SubjectPk))
                    .col(big_integer(SubjectActionExpressions::ActionPk))
                    .col(text(SubjectActionExpressions::Expression))
                    .col(big_integer(SubjectActionExpressions::ExpiredAt))
                    .col(big_integer(SubjectActionExpressions::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_subject_action_expressions_subject_action")
                    .table(SubjectActionExpressions::Table)
                    .col(SubjectActionExpressions::SubjectPk)
                    .col(SubjectActionExpressions::ActionPk)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_subject_action_expressions_expired_at")
                    .table(SubjectActionExpressions::Table)
                    .col(SubjectActionExpressions::ExpiredAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(SubjectActionExpressions::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(
                Table::drop()
                    .table(SubjectActionGroupResources::Table)
                    .to_owned(),
            )
            .await
    }
}

#[derive(DeriveIden)]
enum SubjectActionGroupResources {
    Table,
    Pk,
    SubjectPk,
    ActionPk,
    GroupResource,
}

#[derive(DeriveIden)]
enum SubjectActionExpressions {
    Table,
    Pk,
    SubjectPk,
    ActionPk,
    Expression,
    ExpiredAt,
    UpdatedAt,
}
