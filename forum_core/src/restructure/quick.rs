use std::collections::{BTreeMap, HashMap};

use sea_orm::sea_query::Expr;

use crate::{
    entity::{
        prelude::*,
        topic::{LOCKED_BY_MODERATOR, LOCKED_BY_OWNER, UNLOCKED},
    },
    error::RestructureError,
    ids::{BoardId, TopicId},
};

use super::{
    collaborators::{LogDetails, ModAction, NotificationKind, Permission},
    Actor, RemoveRequest, Restructurer,
};

/// Next lock state, or `None` when the actor may not change it.
fn next_lock(current: i32, any: bool, own: bool) -> Option<i32> {
    if any {
        return Some(if current == UNLOCKED { LOCKED_BY_MODERATOR } else { UNLOCKED });
    }
    match current {
        _ if !own => None,
        UNLOCKED => Some(LOCKED_BY_OWNER),
        LOCKED_BY_OWNER => Some(UNLOCKED),
        // Owners cannot lift a moderator's lock.
        _ => None,
    }
}

impl Restructurer {
    async fn may(&self, actor: &Actor, permission: Permission, board: BoardId) -> bool {
        self.permissions().allowed(actor.member, permission, board).await
    }

    /// Whether `actor` may use an any/own permission pair on `topic`.
    async fn may_any_or_own(
        &self,
        actor: &Actor,
        topic: &TopicModel,
        any: Permission,
        own: Permission,
    ) -> bool {
        self.may(actor, any, topic.board_id).await
            || (topic.member_started == actor.member && self.may(actor, own, topic.board_id).await)
    }

    /// Flips `is_sticky` on the topics the actor may pin. Returns the ids
    /// that changed.
    pub async fn toggle_sticky(
        &self,
        actor: &Actor,
        topics: &[TopicId],
    ) -> Result<Vec<TopicId>, RestructureError> {
        let mut toggled = Vec::new();
        for topic in self.store.topics(topics).await? {
            if !self.may(actor, Permission::MakeSticky, topic.board_id).await {
                continue;
            }
            let sticky = !topic.is_sticky;
            Topic::update_many()
                .col_expr(TopicColumn::IsSticky, Expr::value(sticky))
                .filter(TopicColumn::Id.eq(topic.id))
                .exec(&self.db)
                .await?;

            let action = if sticky { ModAction::Sticky } else { ModAction::Unsticky };
            self.collab
                .log
                .log_action(actor.member, action, LogDetails::topic(topic.id, topic.board_id))
                .await?;
            self.collab
                .notifications
                .send_notifications(topic.id, NotificationKind::Sticky, actor.member)
                .await?;
            toggled.push(topic.id);
        }
        Ok(toggled)
    }

    /// Locks or unlocks the topics the actor may lock. Moderators toggle a
    /// moderator lock; owners toggle their own lock only.
    pub async fn toggle_lock(
        &self,
        actor: &Actor,
        topics: &[TopicId],
    ) -> Result<Vec<TopicId>, RestructureError> {
        let mut toggled = Vec::new();
        for topic in self.store.topics(topics).await? {
            let any = self.may(actor, Permission::LockAny, topic.board_id).await;
            let own = topic.member_started == actor.member
                && self.may(actor, Permission::LockOwn, topic.board_id).await;
            let Some(locked) = next_lock(topic.locked, any, own) else {
                continue;
            };

            Topic::update_many()
                .col_expr(TopicColumn::Locked, Expr::value(locked))
                .filter(TopicColumn::Id.eq(topic.id))
                .exec(&self.db)
                .await?;

            let (action, kind) = if locked == UNLOCKED {
                (ModAction::Unlock, NotificationKind::Unlock)
            } else {
                (ModAction::Lock, NotificationKind::Lock)
            };
            self.collab
                .log
                .log_action(actor.member, action, LogDetails::topic(topic.id, topic.board_id))
                .await?;
            self.collab
                .notifications
                .send_notifications(topic.id, kind, actor.member)
                .await?;
            toggled.push(topic.id);
        }
        Ok(toggled)
    }

    /// Moves each topic the actor may move to its requested board. Fails with
    /// `Access` only when none of the topics may be moved.
    pub async fn move_permissions_filtered(
        &self,
        actor: &Actor,
        destinations: &HashMap<TopicId, BoardId>,
    ) -> Result<Vec<TopicId>, RestructureError> {
        if destinations.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<TopicId> = destinations.keys().copied().collect();

        let mut permitted = 0usize;
        let mut by_target: BTreeMap<BoardId, Vec<TopicId>> = BTreeMap::new();
        for topic in self.store.topics(&ids).await? {
            if !self
                .may_any_or_own(actor, &topic, Permission::MoveAny, Permission::MoveOwn)
                .await
            {
                continue;
            }
            permitted += 1;
            if let Some(&target) = destinations.get(&topic.id) {
                if target != topic.board_id {
                    by_target.entry(target).or_default().push(topic.id);
                }
            }
        }
        if permitted == 0 {
            return Err(RestructureError::Access);
        }

        let mut moved = Vec::new();
        for (target, topics) in by_target {
            moved.extend(self.move_topics(actor, &topics, target, true).await?);
        }
        Ok(moved)
    }

    /// Removes (recycling where configured) each topic the actor may remove.
    /// Owners cannot remove a topic a moderator has locked.
    pub async fn remove_permissions_filtered(
        &self,
        actor: &Actor,
        topics: &[TopicId],
    ) -> Result<Vec<TopicId>, RestructureError> {
        if topics.is_empty() {
            return Ok(Vec::new());
        }

        let mut allowed = Vec::new();
        for topic in self.store.topics(topics).await? {
            let any = self.may(actor, Permission::RemoveAny, topic.board_id).await;
            let own = topic.member_started == actor.member
                && topic.locked != LOCKED_BY_MODERATOR
                && self.may(actor, Permission::RemoveOwn, topic.board_id).await;
            if any || own {
                allowed.push(topic.id);
            }
        }
        if allowed.is_empty() {
            return Err(RestructureError::Access);
        }

        self.remove_topics(
            actor,
            RemoveRequest {
                topics: allowed.clone(),
                decrease_post_count: true,
                ignore_recycling: false,
                log: true,
                board_by_topic: HashMap::new(),
            },
        )
        .await?;
        Ok(allowed)
    }
}
