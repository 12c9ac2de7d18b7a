use std::collections::HashMap;

use sea_orm::sea_query::Expr;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{
    entity::{prelude::*, topic::UNLOCKED},
    error::{RestructureError, ValidationError},
    ids::{BoardId, MemberId, MessageId, PollId, TopicId},
};

use super::{
    batch::Budget,
    collaborators::{LogDetails, ModAction, NotificationKind},
    counters::board_totals,
    subject::{clean_subject, reply_subject},
    Actor, Restructurer,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRequest {
    /// Topics to merge; the first one survives.
    pub topics: Vec<TopicId>,
    /// Board of the merged topic, the survivor's board when `None`.
    pub target_board: Option<BoardId>,
    /// Subject of the merged topic, the survivor's subject when `None`.
    pub subject: Option<String>,
    /// Rename every reply to `reply_prefix + subject`.
    pub enforce_subject: bool,
    /// Topics whose subscribers hear about the merge.
    pub notify_topics: Vec<TopicId>,
    /// Poll kept on the merged topic.
    pub poll: Option<PollId>,
}

/// A topic offered as a merge target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeCandidate {
    pub topic: TopicId,
    pub subject: String,
    pub member_started: MemberId,
    pub starter_name: Option<String>,
    pub is_sticky: bool,
    pub num_replies: i64,
    pub last_msg_id: MessageId,
}

/// Lock state of the merged topic: locked only if every source was,
/// keeping the strongest lock.
fn merged_lock(locks: impl IntoIterator<Item = i32>) -> i32 {
    let mut strongest = None;
    for lock in locks {
        if lock == UNLOCKED {
            return UNLOCKED;
        }
        strongest = Some(strongest.map_or(lock, |s: i32| s.min(lock)));
    }
    strongest.unwrap_or(UNLOCKED)
}

/// The requested poll if it belongs to a merged topic, otherwise the only
/// poll among them. Several polls and no valid choice keep none.
fn surviving_poll(requested: Option<PollId>, polls: &[PollId]) -> Option<PollId> {
    match requested {
        Some(poll) if polls.contains(&poll) => Some(poll),
        _ if polls.len() == 1 => Some(polls[0]),
        _ => None,
    }
}

impl Restructurer {
    /// One page of topics on `board` that could be merged into another,
    /// stickies first, then by latest activity.
    pub async fn mergeable_topics(
        &self,
        board: BoardId,
        exclude: Option<TopicId>,
        only_approved: bool,
        offset: u64,
    ) -> Result<Vec<MergeCandidate>, RestructureError> {
        let mut query = Topic::find().filter(TopicColumn::BoardId.eq(board));
        if let Some(exclude) = exclude {
            query = query.filter(TopicColumn::Id.ne(exclude));
        }
        if only_approved {
            query = query.filter(TopicColumn::Approved.eq(true));
        }
        let topics = query
            .order_by_desc(TopicColumn::IsSticky)
            .order_by_desc(TopicColumn::LastMsgId)
            .offset(offset)
            .limit(self.settings.merge_page_size)
            .all(&self.db)
            .await?;
        if topics.is_empty() {
            return Ok(Vec::new());
        }

        let subjects: HashMap<MessageId, String> = Message::find()
            .select_only()
            .column(MessageColumn::Id)
            .column(MessageColumn::Subject)
            .filter(MessageColumn::Id.is_in(topics.iter().map(|t| t.first_msg_id)))
            .into_tuple::<(MessageId, String)>()
            .all(&self.db)
            .await?
            .into_iter()
            .collect();
        let names: HashMap<MemberId, String> = Member::find()
            .filter(MemberColumn::Id.is_in(topics.iter().map(|t| t.member_started)))
            .all(&self.db)
            .await?
            .into_iter()
            .map(|member| (member.id, member.name))
            .collect();

        Ok(topics
            .into_iter()
            .map(|topic| MergeCandidate {
                subject: subjects.get(&topic.first_msg_id).cloned().unwrap_or_default(),
                starter_name: names.get(&topic.member_started).cloned(),
                topic: topic.id,
                member_started: topic.member_started,
                is_sticky: topic.is_sticky,
                num_replies: topic.num_replies,
                last_msg_id: topic.last_msg_id,
            })
            .collect())
    }

    /// Merges the requested topics into the first of them and returns it.
    pub async fn merge(&self, actor: &Actor, request: MergeRequest) -> Result<TopicId, RestructureError> {
        let mut ids: Vec<TopicId> = Vec::with_capacity(request.topics.len());
        for topic in &request.topics {
            if !ids.contains(topic) {
                ids.push(*topic);
            }
        }
        if ids.len() < 2 {
            return Err(ValidationError::NeedMoreTopics.into());
        }

        let sources = self.store.topics(&ids).await?;
        if sources.len() != ids.len() {
            return Err(ValidationError::CannotFindMessages.into());
        }
        let survivor = &sources[0];
        let discarded: Vec<TopicId> = ids[1..].to_vec();

        let target = request.target_board.unwrap_or(survivor.board_id);
        if self.store.board(target).await?.is_none() {
            return Err(ValidationError::NoBoard.into());
        }

        let raw_subject = match &request.subject {
            Some(subject) => subject.clone(),
            None => self
                .store
                .subject_of(survivor.first_msg_id)
                .await?
                .unwrap_or_default(),
        };
        let subject = clean_subject(&raw_subject, self.settings.subject_max_length);

        let is_sticky = sources.iter().any(|t| t.is_sticky);
        let locked = merged_lock(sources.iter().map(|t| t.locked));
        let num_views: i64 = sources.iter().map(|t| t.num_views).sum();
        let polls: Vec<PollId> = sources.iter().filter_map(|t| t.poll_id).collect();
        let poll = surviving_poll(request.poll, &polls);

        // Contributions to the source boards, taken before anything moves.
        let before = board_totals(&self.db, Some(ids.as_slice())).await?;

        // Once messages are absorbed the sources cannot be told apart again,
        // so past this check the merge runs to the end.
        actor.budget.check()?;
        let budget = Budget::unbounded();

        self.store.absorb_messages(&ids, survivor.id, target).await?;

        let Some(book) = self.store.recount_topic(survivor.id).await? else {
            return Err(ValidationError::CannotFindMessages.into());
        };
        self.store.set_subject(&[book.first_msg_id], &subject).await?;
        if request.enforce_subject {
            let reply = reply_subject(
                &self.settings.reply_prefix,
                &subject,
                self.settings.subject_max_length,
            );
            self.store
                .set_reply_subjects(survivor.id, book.first_msg_id, &reply)
                .await?;
        }

        self.store
            .repoint_topic_records(&ids, survivor.id, target)
            .await?;

        self.reads.collapse(&ids, survivor.id, &budget).await?;
        self.subscriptions
            .collapse(&ids, survivor.id, &budget)
            .await?;

        let dropped_polls: Vec<PollId> = polls.into_iter().filter(|p| Some(*p) != poll).collect();
        self.delete_polls(&dropped_polls).await?;

        Topic::update_many()
            .col_expr(TopicColumn::BoardId, Expr::value(target))
            .col_expr(TopicColumn::IsSticky, Expr::value(is_sticky))
            .col_expr(TopicColumn::Locked, Expr::value(locked))
            .col_expr(TopicColumn::NumViews, Expr::value(num_views))
            .col_expr(TopicColumn::PollId, Expr::value(poll))
            .filter(TopicColumn::Id.eq(survivor.id))
            .exec(&self.db)
            .await?;

        TopicLink::delete_many()
            .filter(
                TopicLinkColumn::TopicId
                    .is_in(discarded.iter().copied())
                    .or(TopicLinkColumn::LinkedTopicId.is_in(discarded.iter().copied())),
            )
            .exec(&self.db)
            .await?;
        SearchSubject::delete_many()
            .filter(SearchSubjectColumn::TopicId.is_in(discarded.iter().copied()))
            .exec(&self.db)
            .await?;
        Topic::delete_many()
            .filter(TopicColumn::Id.is_in(discarded.iter().copied()))
            .exec(&self.db)
            .await?;
        self.store.replace_subject_words(survivor.id, &subject).await?;

        for (board, delta) in before {
            self.counters.decrease(board, delta).await?;
        }
        let after = board_totals(&self.db, Some(std::slice::from_ref(&survivor.id))).await?;
        for (board, delta) in after {
            self.counters.increase(board, delta).await?;
        }

        self.collab
            .log
            .log_action(
                actor.member,
                ModAction::Merge,
                LogDetails::topic(survivor.id, target)
                    .with_extra(json!({ "merged_from": discarded })),
            )
            .await?;
        if request.notify_topics.iter().any(|t| ids.contains(t)) {
            self.collab
                .notifications
                .send_notifications(survivor.id, NotificationKind::Merge, actor.member)
                .await?;
        }
        self.counters.resync_forum_totals().await?;

        tracing::debug!(survivor = %survivor.id, merged = discarded.len(), board = %target, "topics merged");
        Ok(survivor.id)
    }

    pub(crate) async fn delete_polls(&self, polls: &[PollId]) -> Result<(), DbErr> {
        if polls.is_empty() {
            return Ok(());
        }
        PollVote::delete_many()
            .filter(PollVoteColumn::PollId.is_in(polls.iter().copied()))
            .exec(&self.db)
            .await?;
        PollChoice::delete_many()
            .filter(PollChoiceColumn::PollId.is_in(polls.iter().copied()))
            .exec(&self.db)
            .await?;
        Poll::delete_many()
            .filter(PollColumn::Id.is_in(polls.iter().copied()))
            .exec(&self.db)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        entity::topic::{LOCKED_BY_MODERATOR, LOCKED_BY_OWNER},
        test_utils::Fixture,
    };

    #[test]
    fn test_merged_lock() {
        assert_eq!(merged_lock([LOCKED_BY_MODERATOR, UNLOCKED]), UNLOCKED);
        assert_eq!(merged_lock([LOCKED_BY_OWNER, LOCKED_BY_MODERATOR]), LOCKED_BY_MODERATOR);
        assert_eq!(merged_lock([LOCKED_BY_OWNER, LOCKED_BY_OWNER]), LOCKED_BY_OWNER);
    }

    #[test]
    fn test_surviving_poll() {
        let a = PollId::new(1);
        let b = PollId::new(2);
        assert_eq!(surviving_poll(Some(b), &[a, b]), Some(b));
        assert_eq!(surviving_poll(Some(PollId::new(9)), &[a]), Some(a));
        assert_eq!(surviving_poll(None, &[a, b]), None);
        assert_eq!(surviving_poll(None, &[]), None);
    }

    #[tokio::test]
    async fn test_merge_counts() {
        let fx = Fixture::new().await;
        let board = fx.board("General", true).await;
        let alice = fx.member("alice").await;
        let bob = fx.member("bob").await;
        let (t1, ids1) = fx.topic(board, &[(alice, true), (bob, true), (alice, true)]).await;
        let (t2, ids2) = fx.topic(board, &[(bob, true), (bob, true)]).await;
        let engine = fx.restructurer();

        let survivor = engine
            .merge(
                &Actor::new(alice),
                MergeRequest {
                    topics: vec![t1, t2, t1],
                    ..MergeRequest::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(survivor, t1);

        let row = fx.topic_row(t1).await;
        assert_eq!(row.num_replies, 4);
        assert_eq!(row.first_msg_id, ids1[0]);
        assert_eq!(row.last_msg_id, ids2[1]);
        assert_eq!(row.member_updated, bob);
        assert!(Topic::find_by_id(t2).one(&fx.db).await.unwrap().is_none());

        let board_row = fx.board_row(board).await;
        assert_eq!(board_row.num_topics, 1);
        assert_eq!(board_row.num_posts, 5);
    }

    #[tokio::test]
    async fn test_merge_guards() {
        let fx = Fixture::new().await;
        let board = fx.board("General", true).await;
        let alice = fx.member("alice").await;
        let (t1, _) = fx.topic(board, &[(alice, true)]).await;
        let (t2, _) = fx.topic(board, &[(alice, true)]).await;
        let engine = fx.restructurer();
        let actor = Actor::new(alice);

        let cases = [
            (vec![t1, t1], None, ValidationError::NeedMoreTopics),
            (vec![t1, TopicId::new(77)], None, ValidationError::CannotFindMessages),
            (vec![t1, t2], Some(BoardId::new(99)), ValidationError::NoBoard),
        ];
        for (topics, target_board, expected) in cases {
            let err = engine
                .merge(
                    &actor,
                    MergeRequest {
                        topics,
                        target_board,
                        ..MergeRequest::default()
                    },
                )
                .await
                .unwrap_err();
            assert_eq!(err.validation(), Some(expected));
        }
        assert_eq!(Topic::find().count(&fx.db).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_spent_budget_merges_nothing() {
        let fx = Fixture::new().await;
        let general = fx.board("General", true).await;
        let offtopic = fx.board("Off topic", true).await;
        let alice = fx.member("alice").await;
        let (t1, _) = fx.topic(general, &[(alice, true), (alice, true)]).await;
        let (t2, _) = fx.topic(offtopic, &[(alice, true)]).await;
        fx.read_mark(alice, t2, MessageId::new(1)).await;
        let engine = fx.restructurer();
        let request = MergeRequest {
            topics: vec![t1, t2],
            ..MergeRequest::default()
        };
        let spent = Actor::new(alice).with_budget(Budget::until(
            std::time::Instant::now() - std::time::Duration::from_millis(1),
        ));

        let err = engine.merge(&spent, request.clone()).await.unwrap_err();
        assert!(matches!(err, RestructureError::DeadlineExceeded));
        assert_eq!(Topic::find().count(&fx.db).await.unwrap(), 2);
        assert_eq!(fx.topic_row(t1).await.num_replies, 1);
        assert_eq!(fx.board_row(offtopic).await.num_topics, 1);
        assert_eq!(LogTopic::find().count(&fx.db).await.unwrap(), 1);

        engine.merge(&Actor::new(alice), request).await.unwrap();
        assert_eq!(fx.topic_row(t1).await.num_replies, 2);
        let general_row = fx.board_row(general).await;
        assert_eq!((general_row.num_topics, general_row.num_posts), (1, 3));
        let offtopic_row = fx.board_row(offtopic).await;
        assert_eq!((offtopic_row.num_topics, offtopic_row.num_posts), (0, 0));
        let mark = LogTopic::find_by_id((alice, t1)).one(&fx.db).await.unwrap().unwrap();
        assert_eq!(mark.last_read_msg_id, MessageId::new(1));
    }

    #[tokio::test]
    async fn test_merge_read_marks_take_the_lowest() {
        let fx = Fixture::new().await;
        let board = fx.board("General", true).await;
        let alice = fx.member("alice").await;
        let bob = fx.member("bob").await;
        let (t1, _) = fx.topic(board, &[(alice, true)]).await;
        let (t2, _) = fx.topic(board, &[(alice, true)]).await;
        fx.read_mark(bob, t1, MessageId::new(20)).await;
        fx.read_mark(bob, t2, MessageId::new(10)).await;
        let engine = fx.restructurer();

        engine
            .merge(
                &Actor::new(alice),
                MergeRequest {
                    topics: vec![t1, t2],
                    ..MergeRequest::default()
                },
            )
            .await
            .unwrap();

        let marks = LogTopic::find().all(&fx.db).await.unwrap();
        assert_eq!(marks.len(), 1);
        assert_eq!(marks[0].topic_id, t1);
        assert_eq!(marks[0].last_read_msg_id, MessageId::new(10));
    }

    #[tokio::test]
    async fn test_merge_across_boards_and_attributes() {
        let fx = Fixture::new().await;
        let general = fx.board("General", true).await;
        let offtopic = fx.board("Off topic", true).await;
        let alice = fx.member("alice").await;
        let (t1, _) = fx.topic(general, &[(alice, true), (alice, false)]).await;
        let (t2, _) = fx.topic(offtopic, &[(alice, true), (alice, true)]).await;
        fx.set_topic_flags(t1, false, LOCKED_BY_MODERATOR, 3).await;
        fx.set_topic_flags(t2, true, LOCKED_BY_OWNER, 4).await;
        let keep = fx.poll(t1, "Keep?").await;
        let drop = fx.poll(t2, "Drop?").await;
        let engine = fx.restructurer();

        engine
            .merge(
                &Actor::new(alice),
                MergeRequest {
                    topics: vec![t1, t2],
                    target_board: Some(offtopic),
                    subject: Some("Combined".to_string()),
                    enforce_subject: true,
                    notify_topics: vec![t2],
                    poll: Some(keep),
                },
            )
            .await
            .unwrap();

        let row = fx.topic_row(t1).await;
        assert_eq!(row.board_id, offtopic);
        assert!(row.is_sticky);
        assert_eq!(row.locked, LOCKED_BY_MODERATOR);
        assert_eq!(row.num_views, 7);
        assert_eq!(row.poll_id, Some(keep));
        assert_eq!(row.unapproved_posts, 1);
        assert!(Poll::find_by_id(drop).one(&fx.db).await.unwrap().is_none());

        let subjects: Vec<String> = Message::find()
            .filter(MessageColumn::TopicId.eq(t1))
            .order_by_asc(MessageColumn::Id)
            .all(&fx.db)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.subject)
            .collect();
        assert_eq!(subjects, vec!["Combined", "Re: Combined", "Re: Combined", "Re: Combined"]);

        let general_row = fx.board_row(general).await;
        assert_eq!((general_row.num_topics, general_row.num_posts, general_row.unapproved_posts), (0, 0, 0));
        let offtopic_row = fx.board_row(offtopic).await;
        assert_eq!(offtopic_row.num_topics, 1);
        assert_eq!(offtopic_row.num_posts, 3);
        assert_eq!(offtopic_row.unapproved_posts, 1);

        assert_eq!(BackgroundTask::find().count(&fx.db).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_mergeable_topics_order() {
        let fx = Fixture::new().await;
        let board = fx.board("General", true).await;
        let alice = fx.member("alice").await;
        let (t1, _) = fx.topic(board, &[(alice, true)]).await;
        let (t2, _) = fx.topic(board, &[(alice, true)]).await;
        let (t3, _) = fx.topic(board, &[(alice, true)]).await;
        let (pending, _) = fx.topic(board, &[(alice, false)]).await;
        fx.set_topic_flags(t1, true, UNLOCKED, 0).await;
        let engine = fx.restructurer();

        let page = engine
            .mergeable_topics(board, Some(t2), true, 0)
            .await
            .unwrap();
        let order: Vec<TopicId> = page.iter().map(|c| c.topic).collect();
        assert_eq!(order, vec![t1, t3]);
        assert_eq!(page[0].starter_name.as_deref(), Some("alice"));
        assert!(!page[0].subject.is_empty());

        let with_pending = engine.mergeable_topics(board, None, false, 0).await.unwrap();
        assert!(with_pending.iter().any(|c| c.topic == pending));
    }
}
