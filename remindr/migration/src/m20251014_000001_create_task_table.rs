use sea_orm_migration::prelude::*;
use sea_orm_migration::schema::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(DeriveIden)]
enum Task {
    Table,
    Id,
    Title,
    Description,
    DueAt,
    Status,
    NotifyEmail,
    ReminderDaySent,
    ReminderHourSent,
    CreatedAt,
}

const DEFAULT_STATUS: &str = "pending";

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Task::Table)
                    .if_not_exists()
                    .col(pk_auto(Task::Id))
                    .col(string_len(Task::Title, 255))
                    .col(text_null(Task::Description))
                    .col(timestamp_with_time_zone(Task::DueAt))
                    .col(string_len(Task::Status, 16).default(DEFAULT_STATUS))
                    .col(string_len_null(Task::NotifyEmail, 255))
                    .col(boolean(Task::ReminderDaySent).default(false))
                    .col(boolean(Task::ReminderHourSent).default(false))
                    .col(
                        timestamp_with_time_zone(Task::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Task::Table).to_owned())
            .await
    }
}
