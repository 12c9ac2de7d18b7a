use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    error::{RestructureError, ValidationError},
    ids::{MessageId, TopicId},
};

use super::{
    batch::{Batches, Budget},
    collaborators::{LogDetails, ModAction, NotificationKind},
    counters::BoardDelta,
    store::{MessageFilter, NewTopic},
    subject::{clean_subject, reply_subject},
    Actor, Restructurer,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitRequest {
    pub source: TopicId,
    /// Messages to move into the new topic.
    pub messages: Vec<MessageId>,
    /// Subject of the new topic; the source subject is used when blank.
    pub subject: String,
    /// Also give every reply in the new topic `reply_prefix + subject`.
    pub retitle_replies: bool,
}

impl Restructurer {
    /// Moves the selected messages of a topic into a new topic on the same
    /// board and returns its id.
    pub async fn split(&self, actor: &Actor, request: SplitRequest) -> Result<TopicId, RestructureError> {
        if request.messages.is_empty() {
            return Err(ValidationError::NoPostsSelected.into());
        }
        let Some(source) = self.store.topic(request.source).await? else {
            return Err(ValidationError::CannotFindMessages.into());
        };

        let selected: BTreeSet<MessageId> = request.messages.iter().copied().collect();
        let (extracted, remaining): (Vec<MessageId>, Vec<MessageId>) = self
            .store
            .topic_message_ids(source.id)
            .await?
            .into_iter()
            .partition(|id| selected.contains(id));

        if extracted.is_empty() {
            return Err(ValidationError::CannotFindMessages.into());
        }
        if remaining.is_empty() {
            return Err(ValidationError::SelectedAllPosts.into());
        }
        // Both are sorted ascending.
        if extracted[0] < remaining[0] {
            return Err(ValidationError::SplitFirstPost.into());
        }

        let new_side = self
            .store
            .message_set_stats(source.id, MessageFilter::Only(&extracted))
            .await?
            .bookkeeping();
        let old_side = self
            .store
            .message_set_stats(source.id, MessageFilter::Except(&extracted))
            .await?
            .bookkeeping();
        let (Some(new_side), Some(old_side)) = (new_side, old_side) else {
            return Err(ValidationError::CannotFindMessages.into());
        };

        let mut subject = clean_subject(&request.subject, self.settings.subject_max_length);
        if subject.is_empty() {
            let original = self
                .store
                .subject_of(source.first_msg_id)
                .await?
                .unwrap_or_default();
            subject = clean_subject(&original, self.settings.subject_max_length);
        }

        let member_started = self
            .store
            .poster_of(new_side.first_msg_id)
            .await?
            .unwrap_or(source.member_started);
        let member_updated = self
            .store
            .poster_of(new_side.last_msg_id)
            .await?
            .unwrap_or(member_started);

        // Validation is over and writes start here. A half-split topic cannot
        // be picked up again, so once the first row is in the split runs to
        // the end.
        actor.budget.check()?;
        let budget = Budget::unbounded();
        let new_topic = self
            .store
            .insert_topic(NewTopic {
                board: source.board_id,
                bookkeeping: new_side,
                member_started,
                member_updated,
            })
            .await?;

        let mut batches = Batches::new(extracted.clone(), self.settings.batch_size);
        while let Some(chunk) = batches.next_batch(&budget)? {
            self.store
                .move_messages(chunk, new_topic, source.board_id)
                .await?;
        }

        self.store
            .set_subject(&[new_side.first_msg_id], &subject)
            .await?;
        if request.retitle_replies {
            let reply = reply_subject(
                &self.settings.reply_prefix,
                &subject,
                self.settings.subject_max_length,
            );
            self.store
                .set_reply_subjects(new_topic, new_side.first_msg_id, &reply)
                .await?;
        }

        self.store.write_bookkeeping(source.id, &old_side).await?;

        // Messages stay on the board, so only the topic count moves.
        self.counters
            .increase(source.board_id, BoardDelta::single_topic(new_side.approved))
            .await?;

        self.reads
            .duplicate(source.id, new_topic, &budget)
            .await?;
        self.subscriptions
            .copy_topic_subscriptions(source.id, new_topic, &budget)
            .await?;

        self.store.repoint_reports(&extracted, new_topic).await?;
        self.store.replace_subject_words(new_topic, &subject).await?;
        self.store.link_topics(new_topic, source.id, "split").await?;

        self.collab
            .log
            .log_action(
                actor.member,
                ModAction::Split,
                LogDetails::topic(source.id, source.board_id)
                    .with_extra(json!({ "new_topic": new_topic })),
            )
            .await?;
        self.collab
            .notifications
            .send_notifications(source.id, NotificationKind::Split, actor.member)
            .await?;
        self.collab
            .search
            .on_topic_split(new_topic, &extracted)
            .await?;
        self.counters.resync_forum_totals().await?;

        tracing::debug!(
            source = %source.id,
            new_topic = %new_topic,
            moved = extracted.len(),
            "topic split"
        );
        Ok(new_topic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        entity::prelude::*,
        restructure::collaborators::QueuedNotifications,
        test_utils::Fixture,
    };

    fn request(source: TopicId, messages: &[MessageId]) -> SplitRequest {
        SplitRequest {
            source,
            messages: messages.to_vec(),
            subject: "Split off".to_string(),
            retitle_replies: false,
        }
    }

    #[tokio::test]
    async fn test_split_middle_messages() {
        let fx = Fixture::new().await;
        let board = fx.board("General", true).await;
        let alice = fx.member("alice").await;
        let bob = fx.member("bob").await;
        let (topic, ids) = fx
            .topic(
                board,
                &[(alice, true), (alice, true), (bob, true), (alice, true), (bob, true)],
            )
            .await;
        let engine = fx.restructurer();

        let new_topic = engine
            .split(&Actor::new(alice), request(topic, &ids[2..4]))
            .await
            .unwrap();

        let new_row = fx.topic_row(new_topic).await;
        assert_eq!(new_row.first_msg_id, ids[2]);
        assert_eq!(new_row.last_msg_id, ids[3]);
        assert_eq!(new_row.num_replies, 1);
        assert_eq!(new_row.member_started, bob);
        assert_eq!(new_row.member_updated, alice);
        assert!(new_row.approved);

        let old_row = fx.topic_row(topic).await;
        assert_eq!(old_row.first_msg_id, ids[0]);
        assert_eq!(old_row.last_msg_id, ids[4]);
        assert_eq!(old_row.num_replies, 2);

        let board_row = fx.board_row(board).await;
        assert_eq!(board_row.num_topics, 2);
        assert_eq!(board_row.num_posts, 5);

        let lead = Message::find_by_id(ids[2]).one(&fx.db).await.unwrap().unwrap();
        assert_eq!(lead.topic_id, new_topic);
        assert_eq!(lead.subject, "Split off");
    }

    #[tokio::test]
    async fn test_split_guards() {
        let fx = Fixture::new().await;
        let board = fx.board("General", true).await;
        let alice = fx.member("alice").await;
        let (topic, ids) = fx.topic(board, &[(alice, true), (alice, true), (alice, true)]).await;
        let (other, other_ids) = fx.topic(board, &[(alice, true)]).await;
        let engine = fx.restructurer();
        let actor = Actor::new(alice);

        let cases = [
            (request(topic, &[]), ValidationError::NoPostsSelected),
            (request(topic, &ids), ValidationError::SelectedAllPosts),
            (request(topic, &[ids[0]]), ValidationError::SplitFirstPost),
            (request(topic, &other_ids), ValidationError::CannotFindMessages),
            (request(TopicId::new(404), &ids[1..]), ValidationError::CannotFindMessages),
        ];
        for (req, expected) in cases {
            let err = engine.split(&actor, req).await.unwrap_err();
            assert_eq!(err.validation(), Some(expected));
        }

        // Nothing was written by the rejected calls.
        assert_eq!(Topic::find().count(&fx.db).await.unwrap(), 2);
        assert_eq!(fx.topic_row(other).await.first_msg_id, other_ids[0]);
        assert_eq!(fx.board_row(board).await.num_topics, 2);
    }

    #[tokio::test]
    async fn test_split_keeps_read_marks_and_subscriptions() {
        let fx = Fixture::new().await;
        let board = fx.board("General", true).await;
        let alice = fx.member("alice").await;
        let bob = fx.member("bob").await;
        let (topic, ids) = fx.topic(board, &[(alice, true), (alice, true), (alice, true)]).await;
        fx.read_mark(bob, topic, ids[1]).await;
        fx.subscribe(bob, topic, false).await;
        let engine = fx.restructurer();

        let new_topic = engine
            .split(&Actor::new(alice), request(topic, &ids[2..]))
            .await
            .unwrap();

        let mark = LogTopic::find_by_id((bob, new_topic)).one(&fx.db).await.unwrap().unwrap();
        assert_eq!(mark.last_read_msg_id, ids[1]);
        assert!(LogTopic::find_by_id((bob, topic)).one(&fx.db).await.unwrap().is_some());

        let subscriptions = LogNotify::find()
            .filter(LogNotifyColumn::TopicId.eq(new_topic))
            .count(&fx.db)
            .await
            .unwrap();
        assert_eq!(subscriptions, 1);

        let queued = BackgroundTask::find()
            .filter(BackgroundTaskColumn::Kind.eq(QueuedNotifications::TASK_KIND))
            .count(&fx.db)
            .await
            .unwrap();
        assert_eq!(queued, 1);
        assert_eq!(ModerationLog::find().count(&fx.db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_split_pending_messages_and_retitle() {
        let fx = Fixture::new().await;
        let board = fx.board("General", true).await;
        let alice = fx.member("alice").await;
        let (topic, ids) = fx
            .topic(board, &[(alice, true), (alice, false), (alice, true), (alice, true)])
            .await;
        let engine = fx.restructurer();

        let new_topic = engine
            .split(
                &Actor::new(alice),
                SplitRequest {
                    source: topic,
                    messages: vec![ids[1], ids[2]],
                    subject: "  \n".to_string(),
                    retitle_replies: true,
                },
            )
            .await
            .unwrap();

        // The pending message leads, so the new topic awaits approval.
        let new_row = fx.topic_row(new_topic).await;
        assert!(!new_row.approved);
        assert_eq!(new_row.unapproved_posts, 1);
        assert_eq!(new_row.last_msg_id, ids[2]);
        assert_eq!(new_row.num_replies, 0);

        let board_row = fx.board_row(board).await;
        assert_eq!(board_row.num_topics, 1);
        assert_eq!(board_row.unapproved_topics, 1);

        let original = Message::find_by_id(ids[0]).one(&fx.db).await.unwrap().unwrap();
        let lead = Message::find_by_id(ids[1]).one(&fx.db).await.unwrap().unwrap();
        let reply = Message::find_by_id(ids[2]).one(&fx.db).await.unwrap().unwrap();
        assert_eq!(lead.subject, original.subject);
        assert_eq!(reply.subject, format!("Re: {}", original.subject));
    }

    #[tokio::test]
    async fn test_spent_budget_leaves_no_orphan_topic() {
        let fx = Fixture::new().await;
        let board = fx.board("General", true).await;
        let alice = fx.member("alice").await;
        let (topic, ids) = fx.topic(board, &[(alice, true), (alice, true), (alice, true)]).await;
        let engine = fx.restructurer();
        let spent = Actor::new(alice).with_budget(Budget::until(
            std::time::Instant::now() - std::time::Duration::from_millis(1),
        ));

        let err = engine
            .split(&spent, request(topic, &ids[1..]))
            .await
            .unwrap_err();
        assert!(matches!(err, RestructureError::DeadlineExceeded));
        assert_eq!(Topic::find().count(&fx.db).await.unwrap(), 1);
        assert_eq!(fx.board_row(board).await.num_topics, 1);

        let new_topic = engine
            .split(&Actor::new(alice), request(topic, &ids[1..]))
            .await
            .unwrap();
        assert_eq!(Topic::find().count(&fx.db).await.unwrap(), 2);
        assert_eq!(fx.topic_row(new_topic).await.num_replies, 1);
        assert_eq!(fx.topic_row(topic).await.num_replies, 0);
        assert_eq!(fx.board_row(board).await.num_topics, 2);
    }
}
