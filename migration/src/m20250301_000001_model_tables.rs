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
                    .table(Actions::Table)
                    .if_not_exists()
                    .col(pk_column(manager, Actions::Pk))
                    .col(string(Actions::System))
                    .col(string(Actions::Id))
                    .col(string(Actions::Name))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_actions_system_id")
                    .table(Actions::Table)
                    .col(Actions::System)
                    .col(Actions::Id)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ResourceTypes::Table)
                    .if_not_exists()
                    .col(pk_column(manager, ResourceTypes::Pk))
                    .col(string(ResourceTypes::System))
                    .col(string(ResourceTypes::Id))
                    .col(string(ResourceTypes::Name))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_resource_types_system_id")
                    .table(ResourceTypes::Table)
                    .col(ResourceTypes::System)
                    .col(ResourceTypes::Id)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ActionResourceTypes::Table)
                    .if_not_exists()
                    .col(pk_column(manager, ActionResourceTypes::Pk))
                    .col(string(ActionResourceTypes::ActionSystem))
                    .col(string(ActionResourceTypes::ActionId))
                    .col(string(ActionResourceTypes::ResourceTypeSystem))
                    .col(string(ActionResourceTypes::ResourceTypeId))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_action_resource_types_action")
                    .table(ActionResourceTypes::Table)
                    .col(ActionResourceTypes::ActionSystem)
                    .col(ActionResourceTypes::ActionId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Subjects::Table)
                    .if_not_exists()
                    .col(pk_column(manager, Subjects::Pk))
                    .col(string(Subjects::Type))
                    .col(string(Subjects::Id))
                    .col(string(Subjects::Name))
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Subjects::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ActionResourceTypes::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ResourceTypes::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Actions::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Actions {
    Table,
    Pk,
    System,
    Id,
    Name,
}

#[derive(DeriveIden)]
enum ResourceTypes {
    Table,
    Pk,
    System,
    Id,
    Name,
}

#[derive(DeriveIden)]
enum ActionResourceTypes {
    Table,
    Pk,
    ActionSystem,
    ActionId,
    ResourceTypeSystem,
    ResourceTypeId,
}

#[derive(DeriveIden)]
enum Subjects {
    Table,
    Pk,
    Type,
    Id,
    Name,
}
