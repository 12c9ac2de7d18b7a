use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ModerationLog::Table)
                    .col(pk_uuid(ModerationLog::Id))
                    .col(string(ModerationLog::Action))
                    .col(big_integer(ModerationLog::MemberId))
                    .col(big_integer_null(ModerationLog::TopicId))
                    .col(big_integer_null(ModerationLog::BoardId))
                    .col(json(ModerationLog::Extra))
                    .col(timestamp_with_time_zone(ModerationLog::LoggedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(BackgroundTask::Table)
                    .col(pk_uuid(BackgroundTask::Id))
                    .col(string(BackgroundTask::Kind))
                    .col(json(BackgroundTask::Payload))
                    .col(boolean(BackgroundTask::Claimed))
                    .col(timestamp_with_time_zone(BackgroundTask::CreatedAt))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ForumStat::Table)
                    .col(string(ForumStat::Name).primary_key())
                    .col(big_integer(ForumStat::Value))
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ForumStat::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(BackgroundTask::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ModerationLog::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum ModerationLog {
    Table,
    Id,
    Action,
    MemberId,
    TopicId,
    BoardId,
    Extra,
    LoggedAt,
}

#[derive(Iden)]
enum BackgroundTask {
    Table,
    Id,
    Kind,
    Payload,
    Claimed,
    CreatedAt,
}

#[derive(Iden)]
enum ForumStat {
    Table,
    Name,
    Value,
}
