//! Structural changes to the topic/message aggregate: split, merge, move and
//! remove, plus the quick moderation toggles built on them.
//!
//! Every entry point lives on [`Restructurer`]. Requests are validated in full
//! before the first write; after that the steps run in order without an
//! enclosing transaction and the closing stats resync repairs any drift.

use std::sync::Arc;
use std::time::Duration;

use sea_orm::DatabaseConnection;

use crate::{
    config::RestructureSettings,
    entity::prelude::*,
    error::RestructureError,
    ids::{BoardId, MemberId},
};

pub mod batch;
pub mod collaborators;
pub mod counters;
pub mod merge;
pub mod notify_ledger;
pub mod quick;
pub mod read_ledger;
pub mod relocate;
pub mod remove;
pub mod split;
pub mod store;
pub mod subject;

use batch::{Batches, Budget};
use collaborators::{
    CustomSearchIndex, DbMemberStats, DbModerationLog, MemberStats, ModerationLogger,
    NotificationDispatcher, PermissionAuthority, QueuedNotifications, SearchIndex,
};
use counters::{AggregateCounters, ClampedCounters, ForumTotals};
use notify_ledger::NotificationLedger;
use read_ledger::ReadStateLedger;
use store::TopicStore;

pub use merge::{MergeCandidate, MergeRequest};
pub use remove::{RemoveOutcome, RemoveRequest};
pub use split::SplitRequest;

/// The member a call acts for, and how long it may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub member: MemberId,
    pub budget: Budget,
}

impl Actor {
    pub fn new(member: MemberId) -> Self {
        Self {
            member,
            budget: Budget::unbounded(),
        }
    }

    pub fn with_budget(mut self, budget: Budget) -> Self {
        self.budget = budget;
        self
    }
}

#[derive(Clone)]
pub struct Collaborators {
    pub permissions: Arc<dyn PermissionAuthority>,
    pub log: Arc<dyn ModerationLogger>,
    pub notifications: Arc<dyn NotificationDispatcher>,
    pub search: Arc<dyn SearchIndex>,
    pub members: Arc<dyn MemberStats>,
}

impl Collaborators {
    /// Stock collaborators writing to the forum's own tables.
    pub fn database_backed(db: DatabaseConnection, permissions: Arc<dyn PermissionAuthority>) -> Self {
        Self {
            permissions,
            log: Arc::new(DbModerationLog::new(db.clone())),
            notifications: Arc::new(QueuedNotifications::new(db.clone())),
            search: Arc::new(CustomSearchIndex),
            members: Arc::new(DbMemberStats::new(db)),
        }
    }
}

#[derive(Clone)]
pub struct Restructurer {
    db: DatabaseConnection,
    settings: RestructureSettings,
    store: TopicStore,
    counters: Arc<dyn AggregateCounters>,
    reads: ReadStateLedger,
    subscriptions: NotificationLedger,
    collab: Collaborators,
}

impl Restructurer {
    pub fn new(
        db: DatabaseConnection,
        settings: RestructureSettings,
        permissions: Arc<dyn PermissionAuthority>,
    ) -> Self {
        Self {
            store: TopicStore::new(db.clone()),
            counters: Arc::new(ClampedCounters::new(db.clone())),
            reads: ReadStateLedger::new(db.clone(), settings.batch_size),
            subscriptions: NotificationLedger::new(db.clone(), settings.batch_size),
            collab: Collaborators::database_backed(db.clone(), permissions),
            settings,
            db,
        }
    }

    pub fn with_counters(mut self, counters: Arc<dyn AggregateCounters>) -> Self {
        self.counters = counters;
        self
    }

    pub fn with_collaborators(mut self, collab: Collaborators) -> Self {
        self.collab = collab;
        self
    }

    pub fn settings(&self) -> &RestructureSettings {
        &self.settings
    }

    pub fn store(&self) -> &TopicStore {
        &self.store
    }

    /// Actor for `member` bounded by the configured request time limit.
    pub fn actor(&self, member: MemberId) -> Actor {
        match self.settings.request_time_limit_secs {
            0 => Actor::new(member),
            secs => Actor::new(member).with_budget(Budget::within(Duration::from_secs(secs))),
        }
    }

    pub(crate) fn permissions(&self) -> &Arc<dyn PermissionAuthority> {
        &self.collab.permissions
    }

    /// True for the configured recycle board and for any board another board
    /// recycles into.
    pub async fn is_recycle_board(&self, board: BoardId) -> Result<bool, DbErr> {
        if self.settings.recycle_board == Some(board) {
            return Ok(true);
        }
        let pointing = Board::find()
            .filter(BoardColumn::RecycleBoardId.eq(board))
            .count(&self.db)
            .await?;
        Ok(pointing > 0)
    }

    /// Recycle bin for topics removed from `board`, if recycling applies.
    pub(crate) fn recycle_target(&self, board: &BoardModel) -> Option<BoardId> {
        board.recycle_board_id.or(self.settings.recycle_board)
    }

    /// Recomputes every topic's bookkeeping, every board's counters and the
    /// forum totals from the message table.
    pub async fn resync(&self, actor: &Actor) -> Result<ForumTotals, RestructureError> {
        let topics = self.store.all_topic_ids().await?;
        let mut batches = Batches::new(topics, self.settings.batch_size);
        while let Some(chunk) = batches.next_batch(&actor.budget)? {
            for &topic in chunk {
                self.store.recount_topic(topic).await?;
            }
        }

        self.counters.recount_boards().await?;
        let totals = self.counters.resync_forum_totals().await?;

        tracing::debug!(member = %actor.member, ?totals, "forum resynced");
        Ok(totals)
    }
}
