use std::collections::BTreeMap;

use serde_json::json;

use crate::{
    entity::prelude::*,
    error::{RestructureError, ValidationError},
    ids::{BoardId, MessageId, TopicId},
};

use super::{
    batch::{Batches, Budget},
    collaborators::{LogDetails, ModAction, NotificationKind},
    counters::{board_totals, BoardDelta},
    Actor, Restructurer,
};

impl Restructurer {
    /// Moves topics onto `target` and returns the ids that actually moved.
    /// Topics already on `target` are skipped. With `log`, every moved topic
    /// gets a moderation log entry and a notification.
    ///
    /// Topics move in chunks, and each chunk carries its own counter, post
    /// total and read-mark changes. A call stopped by the deadline can be
    /// repeated with the same ids: moved topics are skipped the second time.
    pub async fn move_topics(
        &self,
        actor: &Actor,
        topics: &[TopicId],
        target: BoardId,
        log: bool,
    ) -> Result<Vec<TopicId>, RestructureError> {
        let Some(destination) = self.store.board(target).await? else {
            return Err(ValidationError::NoBoard.into());
        };

        let moving: Vec<TopicModel> = self
            .store
            .topics(topics)
            .await?
            .into_iter()
            .filter(|topic| topic.board_id != target)
            .collect();
        if moving.is_empty() {
            return Ok(Vec::new());
        }
        actor.budget.check()?;

        let recycling = self.is_recycle_board(target).await?;
        let latest_on_target = self.store.latest_message_on_board(target).await?;
        let target_was_seen = self
            .reads
            .board_fully_seen(actor.member, target, latest_on_target)
            .await?;

        let sources: Vec<BoardId> = moving.iter().map(|topic| topic.board_id).collect();
        let source_boards = self.store.boards(&sources).await?;

        let max_msg_id = self.store.max_message_id().await?;
        let low_water = MessageId::new((max_msg_id.get() - self.settings.mark_read_window).max(0));

        let mut moved = Vec::with_capacity(moving.len());
        let mut batches = Batches::new(moving, self.settings.batch_size);
        while let Some(chunk) = batches.next_batch(&actor.budget)? {
            let step = ChunkMove {
                destination: &destination,
                source_boards: &source_boards,
                recycling,
                low_water,
            };
            self.move_chunk(chunk, &step).await?;

            if log {
                for topic in chunk {
                    self.collab
                        .log
                        .log_action(
                            actor.member,
                            ModAction::Move,
                            LogDetails::topic(topic.id, target).with_extra(json!({
                                "board_from": topic.board_id,
                                "board_to": target,
                            })),
                        )
                        .await?;
                    self.collab
                        .notifications
                        .send_notifications(topic.id, NotificationKind::Move, actor.member)
                        .await?;
                }
            }
            moved.extend(chunk.iter().map(|topic| topic.id));
        }

        if target_was_seen {
            self.reads
                .mark_board_seen(actor.member, target, max_msg_id)
                .await?;
        }

        self.counters.resync_forum_totals().await?;

        tracing::debug!(
            member = %actor.member,
            target = %target,
            moved = moved.len(),
            recycling,
            "topics moved"
        );
        Ok(moved)
    }

    /// Moves one chunk of topics with everything that depends on them. Runs
    /// to the end once started.
    async fn move_chunk(&self, chunk: &[TopicModel], step: &ChunkMove<'_>) -> Result<(), RestructureError> {
        let target = step.destination.id;
        let ids: Vec<TopicId> = chunk.iter().map(|topic| topic.id).collect();

        let mut by_source: BTreeMap<BoardId, Vec<(TopicId, MessageId)>> = BTreeMap::new();
        for topic in chunk {
            by_source
                .entry(topic.board_id)
                .or_default()
                .push((topic.id, topic.first_msg_id));
        }

        // Per-board sums are taken before any row changes.
        let totals = board_totals(&self.db, Some(ids.as_slice())).await?;
        let mut arriving = BoardDelta::default();
        for (board, delta) in &totals {
            self.counters.decrease(*board, *delta).await?;
            arriving += *delta;
        }
        if step.recycling {
            arriving = arriving.all_approved();
        }
        self.counters.increase(target, arriving).await?;

        // Posters keep their totals in step with the boards that count posts.
        for (board, entries) in &by_source {
            let counts_posts = step
                .source_boards
                .get(board)
                .map(|b| b.counts_posts)
                .unwrap_or(step.destination.counts_posts);
            if counts_posts == step.destination.counts_posts {
                continue;
            }
            let topics: Vec<TopicId> = entries.iter().map(|(topic, _)| *topic).collect();
            let sign = if step.destination.counts_posts { 1 } else { -1 };
            for (member, posts) in self.store.approved_posts_by_poster(&topics, false).await? {
                self.collab
                    .members
                    .adjust_post_count(member, sign * posts)
                    .await?;
            }
        }

        for (board, entries) in &by_source {
            self.reads
                .carry_forward(*board, entries, step.low_water, &Budget::unbounded())
                .await?;
        }

        self.store.relocate(&ids, target).await?;

        if step.recycling {
            let approved = self.store.force_approve(&ids).await?;
            for topic in &ids {
                self.store.recount_topic(*topic).await?;
            }
            tracing::debug!(topics = ids.len(), approved = approved.len(), "recycled topics force-approved");
        }
        Ok(())
    }
}

struct ChunkMove<'a> {
    destination: &'a BoardModel,
    source_boards: &'a BTreeMap<BoardId, BoardModel>,
    recycling: bool,
    low_water: MessageId,
}
