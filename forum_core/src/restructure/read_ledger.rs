//! Per-member read marks (`log_topic`) and board-level read state.

use std::collections::{BTreeMap, HashMap};

use sea_orm::{sea_query::OnConflict, DatabaseConnection};

use crate::{
    entity::prelude::*,
    error::RestructureError,
    ids::{BoardId, MemberId, MessageId, TopicId},
};

use super::batch::{Batches, Budget};

/// A read mark to be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadMark {
    pub member: MemberId,
    pub topic: TopicId,
    pub last_read: MessageId,
    pub unwatched: bool,
}

impl From<&LogTopicModel> for ReadMark {
    fn from(row: &LogTopicModel) -> Self {
        Self {
            member: row.member_id,
            topic: row.topic_id,
            last_read: row.last_read_msg_id,
            unwatched: row.unwatched,
        }
    }
}

/// Collapses the marks of several topics into one mark per member on
/// `survivor`: the lowest mark wins, together with its unwatched flag, so no
/// unread message of any source topic turns up as read.
pub fn collapse_entries(entries: &[ReadMark], survivor: TopicId) -> Vec<ReadMark> {
    let mut lowest: BTreeMap<MemberId, ReadMark> = BTreeMap::new();
    for entry in entries {
        lowest
            .entry(entry.member)
            .and_modify(|current| {
                if entry.last_read < current.last_read {
                    *current = *entry;
                }
            })
            .or_insert(*entry);
    }

    lowest
        .into_values()
        .map(|mark| ReadMark {
            topic: survivor,
            ..mark
        })
        .collect()
}

#[derive(Clone)]
pub struct ReadStateLedger {
    db: DatabaseConnection,
    batch_size: usize,
}

impl ReadStateLedger {
    pub fn new(db: DatabaseConnection, batch_size: usize) -> Self {
        Self { db, batch_size }
    }

    pub async fn marks(&self, topics: &[TopicId]) -> Result<Vec<ReadMark>, DbErr> {
        if topics.is_empty() {
            return Ok(Vec::new());
        }
        let rows = LogTopic::find()
            .filter(LogTopicColumn::TopicId.is_in(topics.iter().copied()))
            .order_by_asc(LogTopicColumn::MemberId)
            .order_by_asc(LogTopicColumn::TopicId)
            .all(&self.db)
            .await?;
        Ok(rows.iter().map(ReadMark::from).collect())
    }

    /// Upserts `marks` in chunks. Rewriting a chunk is harmless, so an
    /// interrupted call can simply be repeated.
    async fn write(&self, marks: Vec<ReadMark>, budget: &Budget) -> Result<usize, RestructureError> {
        let total = marks.len();
        let mut batches = Batches::new(marks, self.batch_size);
        while let Some(chunk) = batches.next_batch(budget)? {
            let rows = chunk.iter().map(|mark| LogTopicActiveModel {
                member_id: Set(mark.member),
                topic_id: Set(mark.topic),
                last_read_msg_id: Set(mark.last_read),
                unwatched: Set(mark.unwatched),
            });
            LogTopic::insert_many(rows)
                .on_conflict(
                    OnConflict::columns([LogTopicColumn::MemberId, LogTopicColumn::TopicId])
                        .update_columns([LogTopicColumn::LastReadMsgId, LogTopicColumn::Unwatched])
                        .to_owned(),
                )
                .exec_without_returning(&self.db)
                .await?;
        }
        Ok(total)
    }

    /// Copies every mark of `from` onto `to`, unchanged.
    pub async fn duplicate(
        &self,
        from: TopicId,
        to: TopicId,
        budget: &Budget,
    ) -> Result<usize, RestructureError> {
        let marks = self
            .marks(&[from])
            .await?
            .into_iter()
            .map(|mark| ReadMark { topic: to, ..mark })
            .collect();
        self.write(marks, budget).await
    }

    /// Replaces the marks of `topics` (survivor included) with one collapsed
    /// mark per member on `survivor`.
    pub async fn collapse(
        &self,
        topics: &[TopicId],
        survivor: TopicId,
        budget: &Budget,
    ) -> Result<usize, RestructureError> {
        let marks = self.marks(topics).await?;
        let collapsed = collapse_entries(&marks, survivor);

        // Upserting over the survivor's own marks first keeps a rerun exact:
        // the discarded marks are still there to be collapsed again.
        let written = self.write(collapsed, budget).await?;
        let discarded = topics.iter().copied().filter(|topic| *topic != survivor);
        LogTopic::delete_many()
            .filter(LogTopicColumn::TopicId.is_in(discarded))
            .exec(&self.db)
            .await?;
        Ok(written)
    }

    /// Turns "whole board marked read" rows of `board` into per-topic marks
    /// for topics leaving it. A row is carried when it is newer than
    /// `low_water`, newer than the topic's first message and newer than the
    /// member's existing mark.
    pub async fn carry_forward(
        &self,
        board: BoardId,
        topics: &[(TopicId, MessageId)],
        low_water: MessageId,
        budget: &Budget,
    ) -> Result<usize, RestructureError> {
        if topics.is_empty() {
            return Ok(0);
        }
        let board_marks = BoardMarkRead::find()
            .filter(BoardMarkReadColumn::BoardId.eq(board))
            .filter(BoardMarkReadColumn::MsgId.gt(low_water))
            .all(&self.db)
            .await?;
        if board_marks.is_empty() {
            return Ok(0);
        }

        let topic_ids: Vec<TopicId> = topics.iter().map(|(topic, _)| *topic).collect();
        let existing: HashMap<(MemberId, TopicId), ReadMark> = self
            .marks(&topic_ids)
            .await?
            .into_iter()
            .map(|mark| ((mark.member, mark.topic), mark))
            .collect();

        let mut carried = Vec::new();
        for &(topic, first_msg) in topics {
            for board_mark in board_marks.iter().filter(|row| row.msg_id > first_msg) {
                let current = existing.get(&(board_mark.member_id, topic));
                if current.is_some_and(|mark| mark.last_read >= board_mark.msg_id) {
                    continue;
                }
                carried.push(ReadMark {
                    member: board_mark.member_id,
                    topic,
                    last_read: board_mark.msg_id,
                    unwatched: current.map(|mark| mark.unwatched).unwrap_or(false),
                });
            }
        }

        tracing::debug!(board = %board, carried = carried.len(), "board read marks carried forward");
        self.write(carried, budget).await
    }

    /// Whether `member` had seen everything on `board` when last looking at it.
    pub async fn board_fully_seen(
        &self,
        member: MemberId,
        board: BoardId,
        latest: MessageId,
    ) -> Result<bool, DbErr> {
        let seen = BoardSeen::find_by_id((member, board)).one(&self.db).await?;
        Ok(seen.is_some_and(|row| row.msg_id >= latest))
    }

    pub async fn mark_board_seen(
        &self,
        member: MemberId,
        board: BoardId,
        upto: MessageId,
    ) -> Result<(), DbErr> {
        let row = BoardSeenActiveModel {
            member_id: Set(member),
            board_id: Set(board),
            msg_id: Set(upto),
        };
        BoardSeen::insert(row)
            .on_conflict(
                OnConflict::columns([BoardSeenColumn::MemberId, BoardSeenColumn::BoardId])
                    .update_column(BoardSeenColumn::MsgId)
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;
        Ok(())
    }

    pub async fn purge(&self, topics: &[TopicId]) -> Result<u64, DbErr> {
        if topics.is_empty() {
            return Ok(0);
        }
        let result = LogTopic::delete_many()
            .filter(LogTopicColumn::TopicId.is_in(topics.iter().copied()))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::Fixture;

    fn mark(member: i64, topic: i64, last_read: i64, unwatched: bool) -> ReadMark {
        ReadMark {
            member: MemberId::new(member),
            topic: TopicId::new(topic),
            last_read: MessageId::new(last_read),
            unwatched,
        }
    }

    #[test]
    fn test_collapse_keeps_lowest_mark_and_its_flag() {
        let collapsed = collapse_entries(
            &[
                mark(1, 10, 20, false),
                mark(1, 11, 10, true),
                mark(2, 11, 30, false),
            ],
            TopicId::new(10),
        );

        assert_eq!(collapsed, vec![mark(1, 10, 10, true), mark(2, 10, 30, false)]);
    }

    #[tokio::test]
    async fn test_collapse_replaces_source_marks() {
        let fx = Fixture::new().await;
        let board = fx.board("General", true).await;
        let alice = fx.member("alice").await;
        let (t1, _) = fx.topic(board, &[(alice, true)]).await;
        let (t2, _) = fx.topic(board, &[(alice, true)]).await;
        fx.read_mark(alice, t1, MessageId::new(20)).await;
        fx.read_mark(alice, t2, MessageId::new(10)).await;

        let ledger = ReadStateLedger::new(fx.db.clone(), 500);
        ledger.collapse(&[t1, t2], t1, &Budget::unbounded()).await.unwrap();

        let marks = ledger.marks(&[t1, t2]).await.unwrap();
        assert_eq!(marks.len(), 1);
        assert_eq!(marks[0].topic, t1);
        assert_eq!(marks[0].last_read, MessageId::new(10));
    }

    #[tokio::test]
    async fn test_stopped_collapse_keeps_source_marks() {
        let fx = Fixture::new().await;
        let board = fx.board("General", true).await;
        let alice = fx.member("alice").await;
        let bob = fx.member("bob").await;
        let (t1, _) = fx.topic(board, &[(alice, true)]).await;
        let (t2, _) = fx.topic(board, &[(alice, true)]).await;
        fx.read_mark(alice, t1, MessageId::new(20)).await;
        fx.read_mark(alice, t2, MessageId::new(10)).await;
        fx.read_mark(bob, t2, MessageId::new(15)).await;

        let ledger = ReadStateLedger::new(fx.db.clone(), 1);
        let spent = Budget::until(std::time::Instant::now() - std::time::Duration::from_millis(1));
        let err = ledger.collapse(&[t1, t2], t1, &spent).await.unwrap_err();
        assert!(matches!(err, RestructureError::DeadlineExceeded));
        assert_eq!(ledger.marks(&[t1, t2]).await.unwrap().len(), 3);

        // Half-written state: alice's collapsed mark landed, bob's did not.
        fx.read_mark(bob, t1, MessageId::new(40)).await;
        LogTopic::update_many()
            .col_expr(
                LogTopicColumn::LastReadMsgId,
                sea_orm::sea_query::Expr::value(MessageId::new(10)),
            )
            .filter(LogTopicColumn::MemberId.eq(alice))
            .filter(LogTopicColumn::TopicId.eq(t1))
            .exec(&fx.db)
            .await
            .unwrap();

        ledger.collapse(&[t1, t2], t1, &Budget::unbounded()).await.unwrap();
        let marks = ledger.marks(&[t1, t2]).await.unwrap();
        assert_eq!(
            marks.iter().map(|m| (m.member, m.topic, m.last_read)).collect::<Vec<_>>(),
            vec![(alice, t1, MessageId::new(10)), (bob, t1, MessageId::new(15))]
        );
    }

    #[tokio::test]
    async fn test_duplicate_copies_marks() {
        let fx = Fixture::new().await;
        let board = fx.board("General", true).await;
        let alice = fx.member("alice").await;
        let bob = fx.member("bob").await;
        let (t1, _) = fx.topic(board, &[(alice, true)]).await;
        let (t2, _) = fx.topic(board, &[(alice, true)]).await;
        fx.read_mark(alice, t1, MessageId::new(7)).await;
        fx.read_mark(bob, t1, MessageId::new(3)).await;

        let ledger = ReadStateLedger::new(fx.db.clone(), 1);
        let copied = ledger.duplicate(t1, t2, &Budget::unbounded()).await.unwrap();
        assert_eq!(copied, 2);

        let marks = ledger.marks(&[t2]).await.unwrap();
        assert_eq!(marks.len(), 2);
        assert_eq!(ledger.marks(&[t1]).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_carry_forward_only_raises_marks() {
        let fx = Fixture::new().await;
        let board = fx.board("General", true).await;
        let alice = fx.member("alice").await;
        let bob = fx.member("bob").await;
        let carol = fx.member("carol").await;
        let (topic, ids) = fx.topic(board, &[(alice, true), (alice, true), (alice, true)]).await;

        fx.board_mark(alice, board, ids[2]).await;
        fx.board_mark(bob, board, ids[1]).await;
        // Older than the topic itself, nothing to carry.
        fx.board_mark(carol, board, ids[0]).await;
        fx.read_mark(bob, topic, ids[2]).await;

        let ledger = ReadStateLedger::new(fx.db.clone(), 500);
        let carried = ledger
            .carry_forward(board, &[(topic, ids[0])], MessageId::NONE, &Budget::unbounded())
            .await
            .unwrap();
        assert_eq!(carried, 1);

        let marks = ledger.marks(&[topic]).await.unwrap();
        let alice_mark = marks.iter().find(|m| m.member == alice).unwrap();
        let bob_mark = marks.iter().find(|m| m.member == bob).unwrap();
        assert_eq!(alice_mark.last_read, ids[2]);
        assert_eq!(bob_mark.last_read, ids[2]);
        assert!(marks.iter().all(|m| m.member != carol));
    }

    #[tokio::test]
    async fn test_board_seen_round_trip() {
        let fx = Fixture::new().await;
        let board = fx.board("General", true).await;
        let alice = fx.member("alice").await;
        let ledger = ReadStateLedger::new(fx.db.clone(), 500);

        assert!(!ledger.board_fully_seen(alice, board, MessageId::new(4)).await.unwrap());
        ledger.mark_board_seen(alice, board, MessageId::new(4)).await.unwrap();
        assert!(ledger.board_fully_seen(alice, board, MessageId::new(4)).await.unwrap());
        assert!(!ledger.board_fully_seen(alice, board, MessageId::new(5)).await.unwrap());
    }
}
