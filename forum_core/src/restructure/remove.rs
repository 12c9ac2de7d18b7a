use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::{
    entity::prelude::*,
    error::RestructureError,
    ids::{BoardId, MessageId, PollId, TopicId},
};

use super::{
    batch::{Batches, Budget},
    collaborators::{LogDetails, ModAction, NotificationKind},
    counters::board_totals,
    Actor, Restructurer,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveRequest {
    pub topics: Vec<TopicId>,
    /// Take the deleted messages off their posters' totals.
    pub decrease_post_count: bool,
    /// Delete outright even when a recycle board applies.
    pub ignore_recycling: bool,
    pub log: bool,
    /// Board to record in the log per topic, when the caller already knows it.
    pub board_by_topic: HashMap<TopicId, BoardId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveOutcome {
    /// Moved into a recycle bin.
    pub recycled: Vec<TopicId>,
    /// Gone for good.
    pub deleted: Vec<TopicId>,
}

impl Restructurer {
    /// Recycles the requested topics where a recycle board applies and
    /// deletes the rest, including topics already sitting in the bin.
    ///
    /// The deadline is checked before the first write. Recycling then runs
    /// to the end, because a recycled topic looks like one to be deleted
    /// on a second call. Deletion stops between chunks and each chunk takes
    /// its own counters and post totals along, so a repeated call finishes
    /// the job without debiting anything twice.
    pub async fn remove_topics(
        &self,
        actor: &Actor,
        request: RemoveRequest,
    ) -> Result<RemoveOutcome, RestructureError> {
        let topics = self.store.topics(&request.topics).await?;
        if topics.is_empty() {
            return Ok(RemoveOutcome::default());
        }
        actor.budget.check()?;

        let mut outcome = RemoveOutcome::default();
        let mut doomed: Vec<TopicId> = Vec::new();

        if request.ignore_recycling {
            doomed.extend(topics.iter().map(|topic| topic.id));
        } else {
            let boards: Vec<BoardId> = topics.iter().map(|topic| topic.board_id).collect();
            let boards = self.store.boards(&boards).await?;

            let mut to_bin: BTreeMap<BoardId, Vec<TopicId>> = BTreeMap::new();
            for topic in &topics {
                let bin = boards
                    .get(&topic.board_id)
                    .and_then(|board| self.recycle_target(board));
                match bin {
                    Some(bin) if bin != topic.board_id => {
                        to_bin.entry(bin).or_default().push(topic.id);
                    }
                    // Already in the bin, or no bin at all.
                    _ => doomed.push(topic.id),
                }
            }

            let unbounded = actor.with_budget(Budget::unbounded());
            for (bin, ids) in to_bin {
                if self.store.board(bin).await?.is_none() {
                    tracing::warn!(board = %bin, "recycle board is missing, deleting instead");
                    doomed.extend(ids);
                    continue;
                }
                self.store.mark_recycled(&ids).await?;
                for topic in topics.iter().filter(|topic| ids.contains(&topic.id)) {
                    self.store
                        .remember_previous_board(topic.id, topic.board_id)
                        .await?;
                }
                let moved = self.move_topics(&unbounded, &ids, bin, false).await?;
                if request.log {
                    for topic in topics.iter().filter(|topic| moved.contains(&topic.id)) {
                        self.log_removal(actor, topic, &request).await?;
                    }
                }
                outcome.recycled.extend(moved);
            }
        }

        if !doomed.is_empty() {
            self.delete_topics(actor, &doomed, &request).await?;
            outcome.deleted = doomed;
        }

        tracing::debug!(
            member = %actor.member,
            recycled = outcome.recycled.len(),
            deleted = outcome.deleted.len(),
            "topics removed"
        );
        Ok(outcome)
    }

    async fn log_removal(
        &self,
        actor: &Actor,
        topic: &TopicModel,
        request: &RemoveRequest,
    ) -> Result<(), RestructureError> {
        let board = request
            .board_by_topic
            .get(&topic.id)
            .copied()
            .unwrap_or(topic.board_id);
        self.collab
            .log
            .log_action(actor.member, ModAction::Remove, LogDetails::topic(topic.id, board))
            .await?;
        self.collab
            .notifications
            .send_notifications(topic.id, NotificationKind::Remove, actor.member)
            .await?;
        Ok(())
    }

    async fn delete_topics(
        &self,
        actor: &Actor,
        topics: &[TopicId],
        request: &RemoveRequest,
    ) -> Result<(), RestructureError> {
        let mut batches = Batches::new(topics.to_vec(), self.settings.batch_size);
        while let Some(chunk) = batches.next_batch(&actor.budget)? {
            self.delete_chunk(actor, chunk, request).await?;
        }
        self.counters.resync_forum_totals().await?;
        Ok(())
    }

    /// Hard-deletes one chunk of topics. Ids that no longer exist are
    /// skipped, which is what makes a repeated call safe.
    async fn delete_chunk(
        &self,
        actor: &Actor,
        topics: &[TopicId],
        request: &RemoveRequest,
    ) -> Result<(), RestructureError> {
        let rows = self.store.topics(topics).await?;
        if rows.is_empty() {
            return Ok(());
        }
        let ids: Vec<TopicId> = rows.iter().map(|topic| topic.id).collect();

        if request.log {
            for topic in &rows {
                self.log_removal(actor, topic, request).await?;
            }
        }

        if request.decrease_post_count {
            let boards: Vec<BoardId> = rows.iter().map(|topic| topic.board_id).collect();
            let boards = self.store.boards(&boards).await?;
            let counted: Vec<TopicId> = rows
                .iter()
                .filter(|topic| boards.get(&topic.board_id).is_some_and(|b| b.counts_posts))
                .map(|topic| topic.id)
                .collect();
            for (member, posts) in self.store.approved_posts_by_poster(&counted, true).await? {
                self.collab.members.adjust_post_count(member, -posts).await?;
            }
        }

        for (board, delta) in board_totals(&self.db, Some(ids.as_slice())).await? {
            self.counters.decrease(board, delta).await?;
        }

        let polls: Vec<PollId> = rows.iter().filter_map(|topic| topic.poll_id).collect();
        self.delete_polls(&polls).await?;

        let messages = self.store.message_ids_of_topics(&ids).await?;
        self.purge_message_rows(messages, &Budget::unbounded()).await?;

        CalendarEvent::delete_many()
            .filter(CalendarEventColumn::TopicId.is_in(ids.iter().copied()))
            .exec(&self.db)
            .await?;
        TopicLink::delete_many()
            .filter(
                TopicLinkColumn::TopicId
                    .is_in(ids.iter().copied())
                    .or(TopicLinkColumn::LinkedTopicId.is_in(ids.iter().copied())),
            )
            .exec(&self.db)
            .await?;
        self.reads.purge(&ids).await?;
        self.subscriptions.purge(&ids).await?;

        Topic::delete_many()
            .filter(TopicColumn::Id.is_in(ids.iter().copied()))
            .exec(&self.db)
            .await?;
        SearchSubject::delete_many()
            .filter(SearchSubjectColumn::TopicId.is_in(ids.iter().copied()))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// Deletes messages and everything keyed by message id, one chunk at a
    /// time. Each chunk is self-contained, so an interrupted call can be rerun.
    async fn purge_message_rows(
        &self,
        messages: Vec<MessageId>,
        budget: &Budget,
    ) -> Result<(), RestructureError> {
        let mut batches = Batches::new(messages, self.settings.batch_size);
        while let Some(chunk) = batches.next_batch(budget)? {
            let ids = || chunk.iter().copied();
            Attachment::delete_many()
                .filter(AttachmentColumn::MsgId.is_in(ids()))
                .exec(&self.db)
                .await?;
            SearchWord::delete_many()
                .filter(SearchWordColumn::MsgId.is_in(ids()))
                .exec(&self.db)
                .await?;
            MessageLike::delete_many()
                .filter(MessageLikeColumn::MsgId.is_in(ids()))
                .exec(&self.db)
                .await?;
            Mention::delete_many()
                .filter(MentionColumn::MsgId.is_in(ids()))
                .exec(&self.db)
                .await?;
            ApprovalQueue::delete_many()
                .filter(ApprovalQueueColumn::MsgId.is_in(ids()))
                .exec(&self.db)
                .await?;
            ReportedMessage::delete_many()
                .filter(ReportedMessageColumn::MsgId.is_in(ids()))
                .exec(&self.db)
                .await?;
            Message::delete_many()
                .filter(MessageColumn::Id.is_in(ids()))
                .exec(&self.db)
                .await?;
        }
        Ok(())
    }
}
