use entity::activities::{BODY_MAX_CHARS, TITLE_MAX_CHARS};
use sea_orm_migration::prelude::*;

use crate::m20250301_000001_deals::Deals;

#[derive(DeriveIden)]
enum Activities {
    Table,
    Id,
    TargetType,
    TargetId,
    CompanyId,
    Title,
    Body,
    ActorId,
    OccurredAt,
}

#[derive(DeriveIden)]
enum Notifications {
    Table,
    Id,
    UserId,
    Kind,
    Title,
    Message,
    Read,
    DealId,
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
                    .table(Activities::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Activities::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Activities::TargetType).string_len(16).not_null())
                    .col(ColumnDef::new(Activities::TargetId).uuid().not_null())
                    .col(ColumnDef::new(Activities::CompanyId).uuid().not_null())
                    .col(
                        ColumnDef::new(Activities::Title)
                            .string_len(TITLE_MAX_CHARS)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Activities::Body)
                            .string_len(BODY_MAX_CHARS)
                            .not_null()
                            .default(""),
                    )
                    .col(ColumnDef::new(Activities::ActorId).uuid().null())
                    .col(
                        ColumnDef::new(Activities::OccurredAt)
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
                    .name("idx_activities_target_occurred")
                    .table(Activities::Table)
                    .col(Activities::TargetType)
                    .col(Activities::TargetId)
                    .col(Activities::OccurredAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Notifications::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Notifications::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Notifications::UserId).uuid().not_null())
                    .col(ColumnDef::new(Notifications::Kind).string_len(50).not_null())
                    .col(ColumnDef::new(Notifications::Title).string_len(200).not_null())
                    .col(ColumnDef::new(Notifications::Message).text().not_null())
                    .col(
                        ColumnDef::new(Notifications::Read)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Notifications::DealId).uuid().not_null())
                    .col(
                        ColumnDef::new(Notifications::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_notifications_deal")
                            .from(Notifications::Table, Notifications::DealId)
                            .to(Deals::Table, Deals::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_notifications_user")
                    .table(Notifications::Table)
                    .col(Notifications::UserId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Notifications::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Activities::Table).to_owned())
            .await
    }
}
