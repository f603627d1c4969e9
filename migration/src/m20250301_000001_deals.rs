use entity::deals::{CURRENCY_CHARS, LOST_REASON_MAX_CHARS, TITLE_MAX_CHARS};
use sea_orm_migration::prelude::*;

#[derive(DeriveIden)]
pub(crate) enum Deals {
    Table,
    Id,
    Title,
    Description,
    CompanyId,
    CustomerId,
    OwnerId,
    Stage,
    Probability,
    ValueCents,
    Currency,
    ExpectedCloseDate,
    ActualCloseDate,
    LostReason,
    LossReasonCategory,
    ProjectId,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Deals::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Deals::Id).uuid().not_null().primary_key())
                    .col(
                        ColumnDef::new(Deals::Title)
                            .string_len(TITLE_MAX_CHARS)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Deals::Description).text().null())
                    .col(ColumnDef::new(Deals::CompanyId).uuid().not_null())
                    .col(ColumnDef::new(Deals::CustomerId).uuid().not_null())
                    .col(ColumnDef::new(Deals::OwnerId).uuid().not_null())
                    .col(
                        ColumnDef::new(Deals::Stage)
                            .string_len(16)
                            .not_null()
                            .default("lead"),
                    )
                    .col(
                        ColumnDef::new(Deals::Probability)
                            .small_integer()
                            .not_null()
                            .default(10),
                    )
                    .col(
                        ColumnDef::new(Deals::ValueCents)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Deals::Currency)
                            .string_len(CURRENCY_CHARS)
                            .not_null()
                            .default("NOK"),
                    )
                    .col(ColumnDef::new(Deals::ExpectedCloseDate).date().null())
                    .col(ColumnDef::new(Deals::ActualCloseDate).date().null())
                    .col(
                        ColumnDef::new(Deals::LostReason)
                            .string_len(LOST_REASON_MAX_CHARS)
                            .null(),
                    )
                    .col(ColumnDef::new(Deals::LossReasonCategory).string_len(16).null())
                    .col(ColumnDef::new(Deals::ProjectId).uuid().null())
                    .col(
                        ColumnDef::new(Deals::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Deals::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_deals_company_stage")
                    .table(Deals::Table)
                    .col(Deals::CompanyId)
                    .col(Deals::Stage)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_deals_owner")
                    .table(Deals::Table)
                    .col(Deals::OwnerId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Deals::Table).to_owned())
            .await
    }
}
