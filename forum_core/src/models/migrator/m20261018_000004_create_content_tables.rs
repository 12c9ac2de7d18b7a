use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ReportedMessage::Table)
                    .col(pk_auto(ReportedMessage::Id))
                    .col(big_integer(ReportedMessage::MsgId))
                    .col(big_integer(ReportedMessage::TopicId))
                    .col(big_integer(ReportedMessage::BoardId))
                    .col(string(ReportedMessage::Reason))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(CalendarEvent::Table)
                    .col(pk_auto(CalendarEvent::Id))
                    .col(big_integer_null(CalendarEvent::BoardId))
                    .col(big_integer_null(CalendarEvent::TopicId))
                    .col(string(CalendarEvent::Title))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Poll::Table)
                    .col(pk_auto(Poll::Id))
                    .col(string(Poll::Question))
                    .col(boolean(Poll::VotingLocked))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PollChoice::Table)
                    .col(big_integer(PollChoice::PollId))
                    .col(big_integer(PollChoice::ChoiceId))
                    .col(string(PollChoice::Label))
                    .col(big_integer(PollChoice::Votes))
                    .primary_key(
                        Index::create()
                            .col(PollChoice::PollId)
                            .col(PollChoice::ChoiceId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PollVote::Table)
                    .col(big_integer(PollVote::PollId))
                    .col(big_integer(PollVote::MemberId))
                    .col(big_integer(PollVote::ChoiceId))
                    .primary_key(
                        Index::create()
                            .col(PollVote::PollId)
                            .col(PollVote::MemberId)
                            .col(PollVote::ChoiceId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Attachment::Table)
                    .col(pk_auto(Attachment::Id))
                    .col(big_integer(Attachment::MsgId))
                    .col(string(Attachment::Filename))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(MessageLike::Table)
                    .col(big_integer(MessageLike::MsgId))
                    .col(big_integer(MessageLike::MemberId))
                    .primary_key(
                        Index::create()
                            .col(MessageLike::MsgId)
                            .col(MessageLike::MemberId),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Mention::Table)
                    .col(big_integer(Mention::MsgId))
                    .col(big_integer(Mention::MemberId))
                    .primary_key(Index::create().col(Mention::MsgId).col(Mention::MemberId))
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Mention::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(MessageLike::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Attachment::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PollVote::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PollChoice::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Poll::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(CalendarEvent::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ReportedMessage::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum ReportedMessage {
    Table,
    Id,
    MsgId,
    TopicId,
    BoardId,
    Reason,
}

#[derive(Iden)]
enum CalendarEvent {
    Table,
    Id,
    BoardId,
    TopicId,
    Title,
}

#[derive(Iden)]
enum Poll {
    Table,
    Id,
    Question,
    VotingLocked,
}

#[derive(Iden)]
enum PollChoice {
    Table,
    PollId,
    ChoiceId,
    Label,
    Votes,
}

#[derive(Iden)]
enum PollVote {
    Table,
    PollId,
    MemberId,
    ChoiceId,
}

#[derive(Iden)]
enum Attachment {
    Table,
    Id,
    MsgId,
    Filename,
}

#[derive(Iden)]
enum MessageLike {
    Table,
    MsgId,
    MemberId,
}

#[derive(Iden)]
enum Mention {
    Table,
    MsgId,
    MemberId,
}
