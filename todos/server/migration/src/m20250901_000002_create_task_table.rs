use sea_orm_migration::prelude::*;
use sea_orm_migration::schema::*;

use crate::m20250901_000001_create_user_table::User;

#[derive(DeriveMigrationName)]
pub struct Migration;

const FK_TASK_TO_USER: &str = "fk-task-user_id";
const IDX_TASK_USER_ID: &str = "idx-task-user_id";

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Task::Table)
                    .if_not_exists()
                    .col(pk_auto(Task::Id))
                    .col(string_len(Task::Title, 200))
                    .col(text(Task::Description).default(""))
                    .col(date_null(Task::DueDate))
                    .col(boolean(Task::IsCompleted).default(false))
                    .col(
                        timestamp_with_time_zone(Task::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(Task::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(integer(Task::UserId))
                    .foreign_key(
                        ForeignKey::create()
                            .name(FK_TASK_TO_USER)
                            .from(Task::Table, Task::UserId)
                            .to(User::Table, User::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::NoAction),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name(IDX_TASK_USER_ID)
                    .table(Task::Table)
                    .col(Task::UserId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name(IDX_TASK_USER_ID)
                    .table(Task::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(Task::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Task {
    Table,
    Id,
    Title,
    Description,
    DueDate,
    IsCompleted,
    CreatedAt,
    UpdatedAt,
    UserId,
}
