//! Typed reads and writes over the topic/message aggregate.
//!
//! One function per aggregate the engines need. Nothing here validates a
//! request; callers decide what may be written.

use std::collections::BTreeMap;

use sea_orm::{
    sea_query::{Expr, OnConflict},
    DatabaseConnection,
};
use serde::{Deserialize, Serialize};

use crate::{
    entity::{message::RECYCLED_ICON, prelude::*},
    ids::{BoardId, MemberId, MessageId, TopicId},
};

use super::subject::subject_words;

/// Which messages of a topic an aggregate covers.
#[derive(Debug, Clone, Copy)]
pub enum MessageFilter<'a> {
    All,
    Only(&'a [MessageId]),
    Except(&'a [MessageId]),
}

/// Lowest id, highest id and count of one approval group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub min: MessageId,
    pub max: MessageId,
    pub count: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageSetStats {
    pub approved: Option<Span>,
    pub unapproved: Option<Span>,
}

/// Head/tail pointers and counters of a topic as derived from its messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookkeeping {
    pub first_msg_id: MessageId,
    pub last_msg_id: MessageId,
    pub num_replies: i64,
    pub unapproved_posts: i64,
    pub approved: bool,
}

impl MessageSetStats {
    pub fn is_empty(&self) -> bool {
        self.approved.is_none() && self.unapproved.is_none()
    }

    /// `None` for an empty set.
    pub fn bookkeeping(&self) -> Option<Bookkeeping> {
        let first_msg_id = match (self.approved, self.unapproved) {
            (Some(a), Some(u)) => a.min.min(u.min),
            (Some(a), None) => a.min,
            (None, Some(u)) => u.min,
            (None, None) => return None,
        };
        // A pending tail never becomes the latest message.
        let last_msg_id = self
            .approved
            .or(self.unapproved)
            .map(|span| span.max)
            .unwrap_or(first_msg_id);
        let approved_count = self.approved.map(|span| span.count).unwrap_or(0);

        Some(Bookkeeping {
            first_msg_id,
            last_msg_id,
            num_replies: (approved_count - 1).max(0),
            unapproved_posts: self.unapproved.map(|span| span.count).unwrap_or(0),
            approved: self
                .approved
                .map(|span| span.min == first_msg_id)
                .unwrap_or(false),
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewTopic {
    pub board: BoardId,
    pub bookkeeping: Bookkeeping,
    pub member_started: MemberId,
    pub member_updated: MemberId,
}

#[derive(Clone)]
pub struct TopicStore {
    db: DatabaseConnection,
}

impl TopicStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn topic(&self, topic: TopicId) -> Result<Option<TopicModel>, DbErr> {
        Topic::find_by_id(topic).one(&self.db).await
    }

    /// Rows for `topics` in the order given; missing ids are left out.
    pub async fn topics(&self, topics: &[TopicId]) -> Result<Vec<TopicModel>, DbErr> {
        if topics.is_empty() {
            return Ok(Vec::new());
        }
        let mut rows: BTreeMap<TopicId, TopicModel> = Topic::find()
            .filter(TopicColumn::Id.is_in(topics.iter().copied()))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|row| (row.id, row))
            .collect();

        Ok(topics.iter().filter_map(|id| rows.remove(id)).collect())
    }

    pub async fn board(&self, board: BoardId) -> Result<Option<BoardModel>, DbErr> {
        Board::find_by_id(board).one(&self.db).await
    }

    pub async fn boards(&self, boards: &[BoardId]) -> Result<BTreeMap<BoardId, BoardModel>, DbErr> {
        if boards.is_empty() {
            return Ok(BTreeMap::new());
        }
        let rows = Board::find()
            .filter(BoardColumn::Id.is_in(boards.iter().copied()))
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(|row| (row.id, row)).collect())
    }

    pub async fn topic_message_ids(&self, topic: TopicId) -> Result<Vec<MessageId>, DbErr> {
        self.message_ids_of_topics(&[topic]).await
    }

    pub async fn message_ids_of_topics(&self, topics: &[TopicId]) -> Result<Vec<MessageId>, DbErr> {
        if topics.is_empty() {
            return Ok(Vec::new());
        }
        Message::find()
            .select_only()
            .column(MessageColumn::Id)
            .filter(MessageColumn::TopicId.is_in(topics.iter().copied()))
            .order_by_asc(MessageColumn::Id)
            .into_tuple()
            .all(&self.db)
            .await
    }

    pub async fn message_set_stats(
        &self,
        topic: TopicId,
        filter: MessageFilter<'_>,
    ) -> Result<MessageSetStats, DbErr> {
        let mut query = Message::find()
            .select_only()
            .column(MessageColumn::Approved)
            .column_as(MessageColumn::Id.min(), "min_id")
            .column_as(MessageColumn::Id.max(), "max_id")
            .column_as(MessageColumn::Id.count(), "num")
            .filter(MessageColumn::TopicId.eq(topic))
            .group_by(MessageColumn::Approved);
        query = match filter {
            MessageFilter::All => query,
            MessageFilter::Only(ids) => {
                if ids.is_empty() {
                    return Ok(MessageSetStats::default());
                }
                query.filter(MessageColumn::Id.is_in(ids.iter().copied()))
            }
            MessageFilter::Except(ids) if ids.is_empty() => query,
            MessageFilter::Except(ids) => {
                query.filter(MessageColumn::Id.is_not_in(ids.iter().copied()))
            }
        };

        let rows: Vec<(bool, MessageId, MessageId, i64)> = query.into_tuple().all(&self.db).await?;

        let mut stats = MessageSetStats::default();
        for (approved, min, max, count) in rows {
            let span = Some(Span { min, max, count });
            if approved {
                stats.approved = span;
            } else {
                stats.unapproved = span;
            }
        }
        Ok(stats)
    }

    pub async fn poster_of(&self, message: MessageId) -> Result<Option<MemberId>, DbErr> {
        Message::find_by_id(message)
            .select_only()
            .column(MessageColumn::PosterId)
            .into_tuple()
            .one(&self.db)
            .await
    }

    pub async fn subject_of(&self, message: MessageId) -> Result<Option<String>, DbErr> {
        Message::find_by_id(message)
            .select_only()
            .column(MessageColumn::Subject)
            .into_tuple()
            .one(&self.db)
            .await
    }

    pub async fn insert_topic(&self, topic: NewTopic) -> Result<TopicId, DbErr> {
        let book = topic.bookkeeping;
        let row = TopicActiveModel {
            id: NotSet,
            board_id: Set(topic.board),
            first_msg_id: Set(book.first_msg_id),
            last_msg_id: Set(book.last_msg_id),
            num_replies: Set(book.num_replies),
            unapproved_posts: Set(book.unapproved_posts),
            approved: Set(book.approved),
            is_sticky: Set(false),
            locked: Set(crate::entity::topic::UNLOCKED),
            previous_board_id: Set(None),
            member_started: Set(topic.member_started),
            member_updated: Set(topic.member_updated),
            poll_id: Set(None),
            num_views: Set(0),
        };
        Ok(Topic::insert(row).exec(&self.db).await?.last_insert_id)
    }

    /// Writes pointers, counters and the starter/updater of `topic`.
    pub async fn write_bookkeeping(&self, topic: TopicId, book: &Bookkeeping) -> Result<(), DbErr> {
        let started = self.poster_of(book.first_msg_id).await?;
        let updated = self.poster_of(book.last_msg_id).await?;

        let mut update = Topic::update_many()
            .col_expr(TopicColumn::FirstMsgId, Expr::value(book.first_msg_id))
            .col_expr(TopicColumn::LastMsgId, Expr::value(book.last_msg_id))
            .col_expr(TopicColumn::NumReplies, Expr::value(book.num_replies))
            .col_expr(TopicColumn::UnapprovedPosts, Expr::value(book.unapproved_posts))
            .col_expr(TopicColumn::Approved, Expr::value(book.approved));
        if let Some(started) = started {
            update = update.col_expr(TopicColumn::MemberStarted, Expr::value(started));
        }
        if let Some(updated) = updated {
            update = update.col_expr(TopicColumn::MemberUpdated, Expr::value(updated));
        }
        update
            .filter(TopicColumn::Id.eq(topic))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// Recomputes bookkeeping from the message table. `None` when the topic
    /// has no messages.
    pub async fn recount_topic(&self, topic: TopicId) -> Result<Option<Bookkeeping>, DbErr> {
        let stats = self.message_set_stats(topic, MessageFilter::All).await?;
        let Some(book) = stats.bookkeeping() else {
            return Ok(None);
        };
        self.write_bookkeeping(topic, &book).await?;
        Ok(Some(book))
    }

    pub async fn move_messages(
        &self,
        messages: &[MessageId],
        topic: TopicId,
        board: BoardId,
    ) -> Result<(), DbErr> {
        if messages.is_empty() {
            return Ok(());
        }
        Message::update_many()
            .col_expr(MessageColumn::TopicId, Expr::value(topic))
            .col_expr(MessageColumn::BoardId, Expr::value(board))
            .filter(MessageColumn::Id.is_in(messages.iter().copied()))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// Re-points every message of `from` onto `topic`.
    pub async fn absorb_messages(
        &self,
        from: &[TopicId],
        topic: TopicId,
        board: BoardId,
    ) -> Result<u64, DbErr> {
        let result = Message::update_many()
            .col_expr(MessageColumn::TopicId, Expr::value(topic))
            .col_expr(MessageColumn::BoardId, Expr::value(board))
            .filter(MessageColumn::TopicId.is_in(from.iter().copied()))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }

    pub async fn set_subject(&self, messages: &[MessageId], subject: &str) -> Result<(), DbErr> {
        if messages.is_empty() {
            return Ok(());
        }
        Message::update_many()
            .col_expr(MessageColumn::Subject, Expr::value(subject))
            .filter(MessageColumn::Id.is_in(messages.iter().copied()))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// Sets `subject` on every message of `topic` except `lead`.
    pub async fn set_reply_subjects(
        &self,
        topic: TopicId,
        lead: MessageId,
        subject: &str,
    ) -> Result<(), DbErr> {
        Message::update_many()
            .col_expr(MessageColumn::Subject, Expr::value(subject))
            .filter(MessageColumn::TopicId.eq(topic))
            .filter(MessageColumn::Id.ne(lead))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// Moves topic rows and everything board-scoped that hangs off them.
    pub async fn relocate(&self, topics: &[TopicId], board: BoardId) -> Result<(), DbErr> {
        if topics.is_empty() {
            return Ok(());
        }
        Topic::update_many()
            .col_expr(TopicColumn::BoardId, Expr::value(board))
            .filter(TopicColumn::Id.is_in(topics.iter().copied()))
            .exec(&self.db)
            .await?;
        Message::update_many()
            .col_expr(MessageColumn::BoardId, Expr::value(board))
            .filter(MessageColumn::TopicId.is_in(topics.iter().copied()))
            .exec(&self.db)
            .await?;
        CalendarEvent::update_many()
            .col_expr(CalendarEventColumn::BoardId, Expr::value(board))
            .filter(CalendarEventColumn::TopicId.is_in(topics.iter().copied()))
            .exec(&self.db)
            .await?;
        ReportedMessage::update_many()
            .col_expr(ReportedMessageColumn::BoardId, Expr::value(board))
            .filter(ReportedMessageColumn::TopicId.is_in(topics.iter().copied()))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    pub async fn repoint_reports(&self, messages: &[MessageId], topic: TopicId) -> Result<(), DbErr> {
        if messages.is_empty() {
            return Ok(());
        }
        ReportedMessage::update_many()
            .col_expr(ReportedMessageColumn::TopicId, Expr::value(topic))
            .filter(ReportedMessageColumn::MsgId.is_in(messages.iter().copied()))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// Reports and calendar events of `from` follow their topics into `topic`.
    pub async fn repoint_topic_records(
        &self,
        from: &[TopicId],
        topic: TopicId,
        board: BoardId,
    ) -> Result<(), DbErr> {
        ReportedMessage::update_many()
            .col_expr(ReportedMessageColumn::TopicId, Expr::value(topic))
            .col_expr(ReportedMessageColumn::BoardId, Expr::value(board))
            .filter(ReportedMessageColumn::TopicId.is_in(from.iter().copied()))
            .exec(&self.db)
            .await?;
        CalendarEvent::update_many()
            .col_expr(CalendarEventColumn::TopicId, Expr::value(topic))
            .col_expr(CalendarEventColumn::BoardId, Expr::value(board))
            .filter(CalendarEventColumn::TopicId.is_in(from.iter().copied()))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// Approved messages per poster in `topics`. With `skip_recycled`,
    /// messages whose posters were already debited by recycling are left out.
    pub async fn approved_posts_by_poster(
        &self,
        topics: &[TopicId],
        skip_recycled: bool,
    ) -> Result<BTreeMap<MemberId, i64>, DbErr> {
        if topics.is_empty() {
            return Ok(BTreeMap::new());
        }
        let mut query = Message::find()
            .select_only()
            .column(MessageColumn::PosterId)
            .column_as(MessageColumn::Id.count(), "num")
            .filter(MessageColumn::TopicId.is_in(topics.iter().copied()))
            .filter(MessageColumn::Approved.eq(true))
            .group_by(MessageColumn::PosterId);
        if skip_recycled {
            query = query.filter(MessageColumn::Icon.ne(RECYCLED_ICON));
        }

        let rows: Vec<(MemberId, i64)> = query.into_tuple().all(&self.db).await?;
        Ok(rows.into_iter().collect())
    }

    pub async fn max_message_id(&self) -> Result<MessageId, DbErr> {
        let max = Message::find()
            .select_only()
            .column_as(MessageColumn::Id.max(), "max_id")
            .into_tuple::<Option<MessageId>>()
            .one(&self.db)
            .await?;
        Ok(max.flatten().unwrap_or(MessageId::NONE))
    }

    pub async fn latest_message_on_board(&self, board: BoardId) -> Result<MessageId, DbErr> {
        let max = Message::find()
            .select_only()
            .column_as(MessageColumn::Id.max(), "max_id")
            .filter(MessageColumn::BoardId.eq(board))
            .into_tuple::<Option<MessageId>>()
            .one(&self.db)
            .await?;
        Ok(max.flatten().unwrap_or(MessageId::NONE))
    }

    /// Approves every pending message of `topics` and drops their approval
    /// queue rows. Returns the ids that were pending.
    pub async fn force_approve(&self, topics: &[TopicId]) -> Result<Vec<MessageId>, DbErr> {
        if topics.is_empty() {
            return Ok(Vec::new());
        }
        let pending: Vec<MessageId> = Message::find()
            .select_only()
            .column(MessageColumn::Id)
            .filter(MessageColumn::TopicId.is_in(topics.iter().copied()))
            .filter(MessageColumn::Approved.eq(false))
            .into_tuple()
            .all(&self.db)
            .await?;
        if pending.is_empty() {
            return Ok(pending);
        }

        Message::update_many()
            .col_expr(MessageColumn::Approved, Expr::value(true))
            .filter(MessageColumn::Id.is_in(pending.iter().copied()))
            .exec(&self.db)
            .await?;
        ApprovalQueue::delete_many()
            .filter(ApprovalQueueColumn::MsgId.is_in(pending.iter().copied()))
            .exec(&self.db)
            .await?;
        Ok(pending)
    }

    /// Records where a topic came from before it goes to the recycle bin.
    pub async fn remember_previous_board(&self, topic: TopicId, board: BoardId) -> Result<(), DbErr> {
        Topic::update_many()
            .col_expr(TopicColumn::PreviousBoardId, Expr::value(board))
            .col_expr(TopicColumn::IsSticky, Expr::value(false))
            .filter(TopicColumn::Id.eq(topic))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    pub async fn mark_recycled(&self, topics: &[TopicId]) -> Result<(), DbErr> {
        if topics.is_empty() {
            return Ok(());
        }
        Message::update_many()
            .col_expr(MessageColumn::Icon, Expr::value(RECYCLED_ICON))
            .filter(MessageColumn::TopicId.is_in(topics.iter().copied()))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// Rewrites the subject search cache of `topic`.
    pub async fn replace_subject_words(&self, topic: TopicId, subject: &str) -> Result<(), DbErr> {
        SearchSubject::delete_many()
            .filter(SearchSubjectColumn::TopicId.eq(topic))
            .exec(&self.db)
            .await?;

        let words = subject_words(subject);
        if words.is_empty() {
            return Ok(());
        }
        let rows = words.into_iter().map(|word| SearchSubjectActiveModel {
            word: Set(word),
            topic_id: Set(topic),
        });
        SearchSubject::insert_many(rows)
            .on_conflict(
                OnConflict::columns([SearchSubjectColumn::Word, SearchSubjectColumn::TopicId])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;
        Ok(())
    }

    pub async fn link_topics(&self, topic: TopicId, linked: TopicId, kind: &str) -> Result<(), DbErr> {
        let row = TopicLinkActiveModel {
            topic_id: Set(topic),
            linked_topic_id: Set(linked),
            kind: Set(kind.to_string()),
        };
        TopicLink::insert(row)
            .on_conflict(
                OnConflict::columns([TopicLinkColumn::TopicId, TopicLinkColumn::LinkedTopicId])
                    .update_column(TopicLinkColumn::Kind)
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;
        Ok(())
    }

    pub async fn all_topic_ids(&self) -> Result<Vec<TopicId>, DbErr> {
        Topic::find()
            .select_only()
            .column(TopicColumn::Id)
            .order_by_asc(TopicColumn::Id)
            .into_tuple()
            .all(&self.db)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::Fixture;

    fn span(min: i64, max: i64, count: i64) -> Option<Span> {
        Some(Span {
            min: MessageId::new(min),
            max: MessageId::new(max),
            count,
        })
    }

    #[test]
    fn test_bookkeeping_ignores_pending_tail() {
        let stats = MessageSetStats {
            approved: span(3, 8, 4),
            unapproved: span(5, 12, 2),
        };
        let book = stats.bookkeeping().unwrap();
        assert_eq!(book.first_msg_id, MessageId::new(3));
        assert_eq!(book.last_msg_id, MessageId::new(8));
        assert_eq!(book.num_replies, 3);
        assert_eq!(book.unapproved_posts, 2);
        assert!(book.approved);
    }

    #[test]
    fn test_bookkeeping_of_pending_only_topic() {
        let stats = MessageSetStats {
            approved: None,
            unapproved: span(4, 6, 2),
        };
        let book = stats.bookkeeping().unwrap();
        assert_eq!(book.first_msg_id, MessageId::new(4));
        assert_eq!(book.last_msg_id, MessageId::new(6));
        assert_eq!(book.num_replies, 0);
        assert!(!book.approved);

        assert_eq!(MessageSetStats::default().bookkeeping(), None);
    }

    #[test]
    fn test_pending_first_message_makes_topic_unapproved() {
        let stats = MessageSetStats {
            approved: span(5, 9, 3),
            unapproved: span(2, 2, 1),
        };
        let book = stats.bookkeeping().unwrap();
        assert_eq!(book.first_msg_id, MessageId::new(2));
        assert!(!book.approved);
    }

    #[tokio::test]
    async fn test_message_set_stats_filters() {
        let fx = Fixture::new().await;
        let board = fx.board("General", true).await;
        let alice = fx.member("alice").await;
        let (topic, ids) = fx
            .topic(board, &[(alice, true), (alice, true), (alice, false), (alice, true)])
            .await;
        let store = TopicStore::new(fx.db.clone());

        let all = store.message_set_stats(topic, MessageFilter::All).await.unwrap();
        assert_eq!(all.approved.unwrap().count, 3);
        assert_eq!(all.unapproved.unwrap().min, ids[2]);

        let only = store
            .message_set_stats(topic, MessageFilter::Only(&ids[2..]))
            .await
            .unwrap();
        assert_eq!(only.approved, Some(Span { min: ids[3], max: ids[3], count: 1 }));

        let except = store
            .message_set_stats(topic, MessageFilter::Except(&ids[2..]))
            .await
            .unwrap();
        assert_eq!(except.approved.unwrap().max, ids[1]);
        assert_eq!(except.unapproved, None);
    }

    #[tokio::test]
    async fn test_recount_topic_writes_posters() {
        let fx = Fixture::new().await;
        let board = fx.board("General", true).await;
        let alice = fx.member("alice").await;
        let bob = fx.member("bob").await;
        let (topic, ids) = fx.topic(board, &[(alice, true), (bob, true)]).await;
        let store = TopicStore::new(fx.db.clone());

        let book = store.recount_topic(topic).await.unwrap().unwrap();
        assert_eq!(book.last_msg_id, ids[1]);

        let row = fx.topic_row(topic).await;
        assert_eq!(row.member_started, alice);
        assert_eq!(row.member_updated, bob);
        assert_eq!(row.num_replies, 1);
    }

    #[tokio::test]
    async fn test_approved_posts_by_poster_skips_recycled() {
        let fx = Fixture::new().await;
        let board = fx.board("General", true).await;
        let alice = fx.member("alice").await;
        let bob = fx.member("bob").await;
        let (topic, _) = fx
            .topic(board, &[(alice, true), (bob, true), (alice, true), (bob, false)])
            .await;
        let store = TopicStore::new(fx.db.clone());

        let counts = store.approved_posts_by_poster(&[topic], false).await.unwrap();
        assert_eq!(counts.get(&alice), Some(&2));
        assert_eq!(counts.get(&bob), Some(&1));

        store.mark_recycled(&[topic]).await.unwrap();
        let counts = store.approved_posts_by_poster(&[topic], true).await.unwrap();
        assert!(counts.is_empty());
    }

    #[tokio::test]
    async fn test_force_approve_clears_queue() {
        let fx = Fixture::new().await;
        let board = fx.board("General", true).await;
        let alice = fx.member("alice").await;
        let (topic, ids) = fx.topic(board, &[(alice, true), (alice, false)]).await;
        let store = TopicStore::new(fx.db.clone());

        let pending = store.force_approve(&[topic]).await.unwrap();
        assert_eq!(pending, vec![ids[1]]);
        assert_eq!(ApprovalQueue::find().count(&fx.db).await.unwrap(), 0);

        // Nothing left to approve the second time.
        assert!(store.force_approve(&[topic]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_topics_keep_requested_order() {
        let fx = Fixture::new().await;
        let board = fx.board("General", true).await;
        let alice = fx.member("alice").await;
        let (t1, _) = fx.topic(board, &[(alice, true)]).await;
        let (t2, _) = fx.topic(board, &[(alice, true)]).await;
        let store = TopicStore::new(fx.db.clone());

        let rows = store.topics(&[t2, TopicId::new(999), t1]).await.unwrap();
        let ids: Vec<TopicId> = rows.iter().map(|row| row.id).collect();
        assert_eq!(ids, vec![t2, t1]);
    }
}
