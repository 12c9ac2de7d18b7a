use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(LogTopic::Table)
                    .col(big_integer(LogTopic::MemberId))
                    .col(big_integer(LogTopic::TopicId))
                    .col(big_integer(LogTopic::LastReadMsgId))
                    .col(boolean(LogTopic::Unwatched))
                    .primary_key(
                        Index::create()
                            .col(LogTopic::MemberId)
                            .col(LogTopic::TopicId),
                    )
                    .to_owned(),
            )
            .await?;

        // Create index on topic_id
        manager
            .create_index(
                Index::create()
                    .name("idx_log_topic_topic_id")
                    .table(LogTopic::Table)
                    .col(LogTopic::TopicId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(BoardMarkRead::Table)
                    .col(big_integer(BoardMarkRead::MemberId))
                    .col(big_integer(BoardMarkRead::BoardId))
                    .col(big_integer(BoardMarkRead::MsgId))
                    .primary_key(
                        Index::create()
                            .col(BoardMarkRead::MemberId)
                            .col(BoardMarkRead::BoardId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(BoardSeen::Table)
                    .col(big_integer(BoardSeen::MemberId))
                    .col(big_integer(BoardSeen::BoardId))
                    .col(big_integer(BoardSeen::MsgId))
                    .primary_key(
                        Index::create()
                            .col(BoardSeen::MemberId)
                            .col(BoardSeen::BoardId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(LogNotify::Table)
                    .col(pk_auto(LogNotify::Id))
                    .col(big_integer(LogNotify::MemberId))
                    .col(big_integer_null(LogNotify::TopicId))
                    .col(big_integer_null(LogNotify::BoardId))
                    .col(boolean(LogNotify::Sent))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_log_notify_topic_id")
                    .table(LogNotify::Table)
                    .col(LogNotify::TopicId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(LogNotify::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(BoardSeen::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(BoardMarkRead::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(LogTopic::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum LogTopic {
    Table,
    MemberId,
    TopicId,
    LastReadMsgId,
    Unwatched,
}

#[derive(Iden)]
enum BoardMarkRead {
    Table,
    MemberId,
    BoardId,
    MsgId,
}

#[derive(Iden)]
enum BoardSeen {
    Table,
    MemberId,
    BoardId,
    MsgId,
}

#[derive(Iden)]
enum LogNotify {
    Table,
    Id,
    MemberId,
    TopicId,
    BoardId,
    Sent,
}
