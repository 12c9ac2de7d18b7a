//! Services the engines call out to. Each is a trait so a host application
//! can plug in its own; the `Db*`/`Queued*` types are the stock versions that
//! write to the forum's own tables.

use std::collections::HashSet;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{sea_query::Expr, DatabaseConnection};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    entity::prelude::*,
    ids::{BoardId, LogEntryId, MemberId, MessageId, TaskId, TopicId},
};

use super::counters::clamped_add;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Permission {
    SplitAny,
    MergeAny,
    MoveAny,
    MoveOwn,
    RemoveAny,
    RemoveOwn,
    LockAny,
    LockOwn,
    MakeSticky,
}

#[async_trait]
pub trait PermissionAuthority: Send + Sync {
    async fn allowed(&self, member: MemberId, permission: Permission, board: BoardId) -> bool;
}

/// In-memory grant table, enough for hosts that resolve permissions up front.
#[derive(Debug, Default)]
pub struct PermissionGrants {
    grants: RwLock<HashSet<(MemberId, Permission, BoardId)>>,
}

impl PermissionGrants {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, member: MemberId, permission: Permission, board: BoardId) {
        if let Ok(mut grants) = self.grants.write() {
            grants.insert((member, permission, board));
        }
    }

    pub fn revoke(&self, member: MemberId, permission: Permission, board: BoardId) {
        if let Ok(mut grants) = self.grants.write() {
            grants.remove(&(member, permission, board));
        }
    }
}

#[async_trait]
impl PermissionAuthority for PermissionGrants {
    async fn allowed(&self, member: MemberId, permission: Permission, board: BoardId) -> bool {
        self.grants
            .read()
            .map(|grants| grants.contains(&(member, permission, board)))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModAction {
    Split,
    Merge,
    Move,
    Remove,
    Sticky,
    Unsticky,
    Lock,
    Unlock,
}

impl ModAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModAction::Split => "split",
            ModAction::Merge => "merge",
            ModAction::Move => "move",
            ModAction::Remove => "remove",
            ModAction::Sticky => "sticky",
            ModAction::Unsticky => "unsticky",
            ModAction::Lock => "lock",
            ModAction::Unlock => "unlock",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LogDetails {
    pub topic: Option<TopicId>,
    pub board: Option<BoardId>,
    pub extra: serde_json::Value,
}

impl LogDetails {
    pub fn topic(topic: TopicId, board: BoardId) -> Self {
        Self {
            topic: Some(topic),
            board: Some(board),
            extra: json!({}),
        }
    }

    pub fn with_extra(mut self, extra: serde_json::Value) -> Self {
        self.extra = extra;
        self
    }
}

#[async_trait]
pub trait ModerationLogger: Send + Sync {
    async fn log_action(
        &self,
        actor: MemberId,
        action: ModAction,
        details: LogDetails,
    ) -> Result<(), DbErr>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    Split,
    Merge,
    Move,
    Remove,
    Sticky,
    Lock,
    Unlock,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Split => "split",
            NotificationKind::Merge => "merge",
            NotificationKind::Move => "move",
            NotificationKind::Remove => "remove",
            NotificationKind::Sticky => "sticky",
            NotificationKind::Lock => "lock",
            NotificationKind::Unlock => "unlock",
        }
    }
}

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// `actor` is the member who caused the event; they are not notified.
    async fn send_notifications(
        &self,
        topic: TopicId,
        kind: NotificationKind,
        actor: MemberId,
    ) -> Result<(), DbErr>;
}

#[async_trait]
pub trait SearchIndex: Send + Sync {
    async fn on_topic_split(&self, new_topic: TopicId, messages: &[MessageId]) -> Result<(), DbErr>;
}

#[async_trait]
pub trait MemberStats: Send + Sync {
    async fn adjust_post_count(&self, member: MemberId, delta: i64) -> Result<(), DbErr>;
}

#[derive(Clone)]
pub struct DbModerationLog {
    db: DatabaseConnection,
}

impl DbModerationLog {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ModerationLogger for DbModerationLog {
    async fn log_action(
        &self,
        actor: MemberId,
        action: ModAction,
        details: LogDetails,
    ) -> Result<(), DbErr> {
        let entry = ModerationLogActiveModel {
            id: Set(LogEntryId::new()),
            action: Set(action.as_str().to_string()),
            member_id: Set(actor),
            topic_id: Set(details.topic),
            board_id: Set(details.board),
            extra: Set(details.extra),
            logged_at: Set(Utc::now()),
        };
        ModerationLog::insert(entry)
            .exec_without_returning(&self.db)
            .await?;

        tracing::debug!(action = action.as_str(), member = %actor, "moderation action logged");
        Ok(())
    }
}

/// Queues notification work as `background_task` rows for the mail sender.
#[derive(Clone)]
pub struct QueuedNotifications {
    db: DatabaseConnection,
}

impl QueuedNotifications {
    pub const TASK_KIND: &'static str = "topic_notification";

    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl NotificationDispatcher for QueuedNotifications {
    async fn send_notifications(
        &self,
        topic: TopicId,
        kind: NotificationKind,
        actor: MemberId,
    ) -> Result<(), DbErr> {
        let task = BackgroundTaskActiveModel {
            id: Set(TaskId::new()),
            kind: Set(Self::TASK_KIND.to_string()),
            payload: Set(json!({
                "topic": topic,
                "event": kind.as_str(),
                "exclude_member": actor,
            })),
            claimed: Set(false),
            created_at: Set(Utc::now()),
        };
        BackgroundTask::insert(task)
            .exec_without_returning(&self.db)
            .await?;
        Ok(())
    }
}

/// The custom word index keys entries by message, so a split needs no
/// rewrite; the hook only leaves a trace.
#[derive(Clone, Copy, Debug, Default)]
pub struct CustomSearchIndex;

#[async_trait]
impl SearchIndex for CustomSearchIndex {
    async fn on_topic_split(&self, new_topic: TopicId, messages: &[MessageId]) -> Result<(), DbErr> {
        tracing::debug!(topic = %new_topic, messages = messages.len(), "search index notified of split");
        Ok(())
    }
}

#[derive(Clone)]
pub struct DbMemberStats {
    db: DatabaseConnection,
}

impl DbMemberStats {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl MemberStats for DbMemberStats {
    async fn adjust_post_count(&self, member: MemberId, delta: i64) -> Result<(), DbErr> {
        if delta == 0 {
            return Ok(());
        }
        Member::update_many()
            .col_expr(MemberColumn::Posts, clamped_add(Expr::col(MemberColumn::Posts), delta))
            .filter(MemberColumn::Id.eq(member))
            .exec(&self.db)
            .await?;
        Ok(())
    }
}
