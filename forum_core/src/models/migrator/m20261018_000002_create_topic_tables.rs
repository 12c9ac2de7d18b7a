use sea_orm_migration::{prelude::*, schema::*};

use super::m20261018_000001_create_board_tables::Board;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Topic::Table)
                    .col(pk_auto(Topic::Id))
                    .col(big_integer(Topic::BoardId))
                    .col(big_integer(Topic::FirstMsgId))
                    .col(big_integer(Topic::LastMsgId))
                    .col(big_integer(Topic::NumReplies))
                    .col(big_integer(Topic::UnapprovedPosts))
                    .col(boolean(Topic::Approved))
                    .col(boolean(Topic::IsSticky))
                    .col(integer(Topic::Locked))
                    .col(big_integer_null(Topic::PreviousBoardId))
                    .col(big_integer(Topic::MemberStarted))
                    .col(big_integer(Topic::MemberUpdated))
                    .col(big_integer_null(Topic::PollId))
                    .col(big_integer(Topic::NumViews))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-topic-board_id")
                            .from(Topic::Table, Topic::BoardId)
                            .to(Board::Table, Board::Id)
                            .on_delete(ForeignKeyAction::Cascade)
                            .on_update(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Create index on board_id
        manager
            .create_index(
                Index::create()
                    .name("idx_topic_board_id")
                    .table(Topic::Table)
                    .col(Topic::BoardId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Message::Table)
                    .col(pk_auto(Message::Id))
                    .col(big_integer(Message::TopicId))
                    .col(big_integer(Message::BoardId))
                    .col(boolean(Message::Approved))
                    .col(big_integer(Message::PosterId))
                    .col(string(Message::Subject))
                    .col(text(Message::Body))
                    .col(timestamp_with_time_zone(Message::PosterTime))
                    .col(string(Message::Icon))
                    .to_owned(),
            )
            .await?;

        // Create index on topic_id, id for first/last lookups
        manager
            .create_index(
                Index::create()
                    .name("idx_message_topic_id")
                    .table(Message::Table)
                    .col(Message::TopicId)
                    .col(Message::Id)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_message_poster_id")
                    .table(Message::Table)
                    .col(Message::PosterId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ApprovalQueue::Table)
                    .col(big_integer(ApprovalQueue::MsgId).primary_key())
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(TopicLink::Table)
                    .col(big_integer(TopicLink::TopicId))
                    .col(big_integer(TopicLink::LinkedTopicId))
                    .col(string(TopicLink::Kind))
                    .primary_key(
                        Index::create()
                            .col(TopicLink::TopicId)
                            .col(TopicLink::LinkedTopicId),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TopicLink::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ApprovalQueue::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Message::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Topic::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum Topic {
    Table,
    Id,
    BoardId,
    FirstMsgId,
    LastMsgId,
    NumReplies,
    UnapprovedPosts,
    Approved,
    IsSticky,
    Locked,
    PreviousBoardId,
    MemberStarted,
    MemberUpdated,
    PollId,
    NumViews,
}

#[derive(Iden)]
pub enum Message {
    Table,
    Id,
    TopicId,
    BoardId,
    Approved,
    PosterId,
    Subject,
    Body,
    PosterTime,
    Icon,
}

#[derive(Iden)]
enum ApprovalQueue {
    Table,
    MsgId,
}

#[derive(Iden)]
enum TopicLink {
    Table,
    TopicId,
    LinkedTopicId,
    Kind,
}
