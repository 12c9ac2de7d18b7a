//! Denormalized board counters and forum-wide totals.
//!
//! Counter writes are single clamped statements, never read-modify-write, so
//! two interleaved restructuring calls cannot drive a counter negative. Drift
//! is repaired by [`AggregateCounters::recount_boards`] and the forum totals
//! resync that ends every move and remove.

use std::collections::BTreeMap;
use std::ops::{Add, AddAssign};

use async_trait::async_trait;
use sea_orm::{
    sea_query::{Expr, OnConflict, SimpleExpr},
    ConnectionTrait, DatabaseConnection,
};
use serde::{Deserialize, Serialize};

use crate::{
    entity::{forum_stat, prelude::*},
    ids::{BoardId, MessageId, TopicId},
};

/// `current + delta`, never below zero.
pub(crate) fn clamped_add(current: Expr, delta: i64) -> SimpleExpr {
    if delta >= 0 {
        return current.add(delta);
    }
    let amount = delta.saturating_neg();
    Expr::case(current.clone().lt(amount), Expr::value(0i64))
        .finally(current.sub(amount))
        .into()
}

/// Topic and post totals for one board, or the change applied to them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardDelta {
    pub topics: i64,
    pub unapproved_topics: i64,
    pub posts: i64,
    pub unapproved_posts: i64,
}

impl BoardDelta {
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    /// Everything counted as approved, as on the recycle board.
    pub fn all_approved(self) -> Self {
        Self {
            topics: self.topics + self.unapproved_topics,
            unapproved_topics: 0,
            posts: self.posts + self.unapproved_posts,
            unapproved_posts: 0,
        }
    }

    pub fn single_topic(approved: bool) -> Self {
        if approved {
            Self {
                topics: 1,
                ..Self::default()
            }
        } else {
            Self {
                unapproved_topics: 1,
                ..Self::default()
            }
        }
    }

    fn of_board(board: &BoardModel) -> Self {
        Self {
            topics: board.num_topics,
            unapproved_topics: board.unapproved_topics,
            posts: board.num_posts,
            unapproved_posts: board.unapproved_posts,
        }
    }

    fn exceeds(&self, current: &Self) -> bool {
        self.topics > current.topics
            || self.unapproved_topics > current.unapproved_topics
            || self.posts > current.posts
            || self.unapproved_posts > current.unapproved_posts
    }
}

impl Add for BoardDelta {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Self {
            topics: self.topics + other.topics,
            unapproved_topics: self.unapproved_topics + other.unapproved_topics,
            posts: self.posts + other.posts,
            unapproved_posts: self.unapproved_posts + other.unapproved_posts,
        }
    }
}

impl AddAssign for BoardDelta {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

/// Per-board totals, grouped by approval, over `topics` (or every topic).
pub(crate) async fn board_totals<C: ConnectionTrait>(
    db: &C,
    topics: Option<&[TopicId]>,
) -> Result<BTreeMap<BoardId, BoardDelta>, DbErr> {
    let mut topic_query = Topic::find()
        .select_only()
        .column(TopicColumn::BoardId)
        .column(TopicColumn::Approved)
        .column_as(TopicColumn::Id.count(), "num")
        .group_by(TopicColumn::BoardId)
        .group_by(TopicColumn::Approved);
    let mut message_query = Message::find()
        .select_only()
        .column(MessageColumn::BoardId)
        .column(MessageColumn::Approved)
        .column_as(MessageColumn::Id.count(), "num")
        .group_by(MessageColumn::BoardId)
        .group_by(MessageColumn::Approved);
    if let Some(topics) = topics {
        topic_query = topic_query.filter(TopicColumn::Id.is_in(topics.iter().copied()));
        message_query = message_query.filter(MessageColumn::TopicId.is_in(topics.iter().copied()));
    }

    let topic_rows: Vec<(BoardId, bool, i64)> = topic_query.into_tuple().all(db).await?;
    let message_rows: Vec<(BoardId, bool, i64)> = message_query.into_tuple().all(db).await?;
    Ok(fold_totals(topic_rows, message_rows))
}

fn fold_totals(
    topic_rows: Vec<(BoardId, bool, i64)>,
    message_rows: Vec<(BoardId, bool, i64)>,
) -> BTreeMap<BoardId, BoardDelta> {
    let mut totals: BTreeMap<BoardId, BoardDelta> = BTreeMap::new();
    for (board, approved, count) in topic_rows {
        let entry = totals.entry(board).or_default();
        if approved {
            entry.topics += count;
        } else {
            entry.unapproved_topics += count;
        }
    }
    for (board, approved, count) in message_rows {
        let entry = totals.entry(board).or_default();
        if approved {
            entry.posts += count;
        } else {
            entry.unapproved_posts += count;
        }
    }
    totals
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForumTotals {
    pub total_topics: i64,
    pub total_messages: i64,
    pub max_msg_id: MessageId,
}

/// Swappable so a computed (non-denormalized) strategy can replace the
/// clamped counters without touching the engines.
#[async_trait]
pub trait AggregateCounters: Send + Sync {
    async fn decrease(&self, board: BoardId, delta: BoardDelta) -> Result<(), DbErr>;

    async fn increase(&self, board: BoardId, delta: BoardDelta) -> Result<(), DbErr>;

    /// Rewrites every board's counters from the topic and message rows.
    async fn recount_boards(&self) -> Result<(), DbErr>;

    async fn resync_forum_totals(&self) -> Result<ForumTotals, DbErr>;
}

#[derive(Clone)]
pub struct ClampedCounters {
    db: DatabaseConnection,
}

impl ClampedCounters {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn apply(&self, board: BoardId, delta: BoardDelta, sign: i64) -> Result<(), DbErr> {
        Board::update_many()
            .col_expr(
                BoardColumn::NumTopics,
                clamped_add(Expr::col(BoardColumn::NumTopics), sign * delta.topics),
            )
            .col_expr(
                BoardColumn::UnapprovedTopics,
                clamped_add(
                    Expr::col(BoardColumn::UnapprovedTopics),
                    sign * delta.unapproved_topics,
                ),
            )
            .col_expr(
                BoardColumn::NumPosts,
                clamped_add(Expr::col(BoardColumn::NumPosts), sign * delta.posts),
            )
            .col_expr(
                BoardColumn::UnapprovedPosts,
                clamped_add(
                    Expr::col(BoardColumn::UnapprovedPosts),
                    sign * delta.unapproved_posts,
                ),
            )
            .filter(BoardColumn::Id.eq(board))
            .exec(&self.db)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl AggregateCounters for ClampedCounters {
    async fn decrease(&self, board: BoardId, delta: BoardDelta) -> Result<(), DbErr> {
        if delta.is_zero() {
            return Ok(());
        }

        // Only to report drift; the update itself clamps.
        if let Some(current) = Board::find_by_id(board).one(&self.db).await? {
            let current = BoardDelta::of_board(&current);
            if delta.exceeds(&current) {
                tracing::warn!(
                    target: "forum_core::counters",
                    board = %board,
                    ?current,
                    ?delta,
                    "board counter clamped at zero"
                );
            }
        }

        self.apply(board, delta, -1).await
    }

    async fn increase(&self, board: BoardId, delta: BoardDelta) -> Result<(), DbErr> {
        if delta.is_zero() {
            return Ok(());
        }
        self.apply(board, delta, 1).await
    }

    async fn recount_boards(&self) -> Result<(), DbErr> {
        let totals = board_totals(&self.db, None).await?;

        for board in Board::find().all(&self.db).await? {
            let actual = totals.get(&board.id).copied().unwrap_or_default();
            if BoardDelta::of_board(&board) == actual {
                continue;
            }

            tracing::debug!(board = %board.id, ?actual, "board counters recounted");
            let mut active: BoardActiveModel = board.into();
            active.num_topics = Set(actual.topics);
            active.unapproved_topics = Set(actual.unapproved_topics);
            active.num_posts = Set(actual.posts);
            active.unapproved_posts = Set(actual.unapproved_posts);
            active.update(&self.db).await?;
        }

        Ok(())
    }

    async fn resync_forum_totals(&self) -> Result<ForumTotals, DbErr> {
        let total_topics = Topic::find()
            .filter(TopicColumn::Approved.eq(true))
            .count(&self.db)
            .await?;
        let total_messages = Message::find()
            .filter(MessageColumn::Approved.eq(true))
            .count(&self.db)
            .await?;
        let max_msg_id = Message::find()
            .select_only()
            .column_as(MessageColumn::Id.max(), "max_id")
            .into_tuple::<Option<MessageId>>()
            .one(&self.db)
            .await?
            .flatten()
            .unwrap_or(MessageId::NONE);

        let totals = ForumTotals {
            total_topics: total_topics as i64,
            total_messages: total_messages as i64,
            max_msg_id,
        };

        let rows = [
            (forum_stat::TOTAL_TOPICS, totals.total_topics),
            (forum_stat::TOTAL_MESSAGES, totals.total_messages),
            (forum_stat::MAX_MSG_ID, totals.max_msg_id.get()),
        ]
        .into_iter()
        .map(|(name, value)| ForumStatActiveModel {
            name: Set(name.to_string()),
            value: Set(value),
        });

        ForumStat::insert_many(rows)
            .on_conflict(
                OnConflict::column(ForumStatColumn::Name)
                    .update_column(ForumStatColumn::Value)
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        Ok(totals)
    }
}
