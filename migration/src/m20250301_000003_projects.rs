use entity::deals::CURRENCY_CHARS;
use entity::projects::NAME_MAX_CHARS;
use sea_orm_migration::prelude::*;

use crate::m20250301_000001_deals::Deals;

#[derive(DeriveIden)]
enum Projects {
    Table,
    Id,
    Name,
    DealId,
    CompanyId,
    CustomerId,
    ManagerId,
    Status,
    ValueCents,
    Currency,
    StartDate,
    CreatedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Projects::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Projects::Id).uuid().not_null().primary_key())
                    .col(
                        ColumnDef::new(Projects::Name)
                            .string_len(NAME_MAX_CHARS)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Projects::DealId).uuid().null().unique_key())
                    .col(ColumnDef::new(Projects::CompanyId).uuid().not_null())
                    .col(ColumnDef::new(Projects::CustomerId).uuid().not_null())
                    .col(ColumnDef::new(Projects::ManagerId).uuid().null())
                    .col(
                        ColumnDef::new(Projects::Status)
                            .string_len(16)
                            .not_null()
                            .default("planning"),
                    )
                    .col(
                        ColumnDef::new(Projects::ValueCents)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Projects::Currency)
                            .string_len(CURRENCY_CHARS)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Projects::StartDate).date().not_null())
                    .col(
                        ColumnDef::new(Projects::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_projects_deal")
                            .from(Projects::Table, Projects::DealId)
                            .to(Deals::Table, Deals::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Projects::Table).to_owned())
            .await
    }
}
