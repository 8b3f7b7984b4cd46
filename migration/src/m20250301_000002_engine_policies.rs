use sea_orm_migration::{prelude::*, schema::*};

use crate::pk_column;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Expressions::Table)
                    .if_not_exists()
                    .col(pk_column(manager, Expressions::Pk))
                    .col(text(Expressions::Expression))
                    .to_owned(),
            )
            .await?;

        // ABAC policies pulled by decision engines
        manager
            .create_table(
                Table::create()
                    .table(Policies::Table)
                    .if_not_exists()
                    .col(pk_column(manager, Policies::Pk))
                    .col(big_integer(Policies::SubjectPk))
                    .col(big_integer(Policies::ActionPk))
                    .col(big_integer(Policies::ExpressionPk))
                    .col(big_integer(Policies::TemplateId).default(0))
                    .col(big_integer(Policies::ExpiredAt))
                    .col(big_integer(Policies::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_policies_updated_at")
                    .table(Policies::Table)
                    .col(Policies::UpdatedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RbacGroupResourcePolicies::Table)
                    .if_not_exists()
                    .col(pk_column(manager, RbacGroupResourcePolicies::Pk))
                    .col(big_integer(RbacGroupResourcePolicies::GroupPk))
                    .col(big_integer(RbacGroupResourcePolicies::TemplateId).default(0))
                    .col(string(RbacGroupResourcePolicies::System))
                    .col(string(RbacGroupResourcePolicies::ActionPks))
                    .col(big_integer(
                        RbacGroupResourcePolicies::ActionRelatedResourceTypePk,
                    ))
                    .col(big_integer(RbacGroupResourcePolicies::ResourceTypePk))
                    .col(string(RbacGroupResourcePolicies::ResourceId))
                    .col(big_integer(RbacGroupResourcePolicies::UpdatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_rbac_group_resource_policies_updated_at")
                    .table(RbacGroupResourcePolicies::Table)
                    .col(RbacGroupResourcePolicies::UpdatedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(RbacGroupResourcePolicies::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(Policies::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Expressions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Expressions {
    Table,
    Pk,
    Expression,
}

#[derive(DeriveIden)]
enum Policies {
    Table,
    Pk,
    SubjectPk,
    ActionPk,
    ExpressionPk,
    TemplateId,
    ExpiredAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum RbacGroupResourcePolicies {
    Table,
    Pk,
    GroupPk,
    TemplateId,
    System,
    ActionPks,
    ActionRelatedResourceTypePk,
    ResourceTypePk,
    ResourceId,
    UpdatedAt,
}
