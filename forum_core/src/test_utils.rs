//! In-memory forum fixtures for tests.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{sea_query::Expr, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;

use crate::{
    config::RestructureSettings,
    entity::prelude::*,
    ids::{AttachmentId, BoardId, ChoiceId, MemberId, MessageId, PollId, TopicId},
    models::migrator::Migrator,
    restructure::{
        collaborators::{Permission, PermissionAuthority},
        counters::BoardDelta,
        store::{MessageFilter, NewTopic, TopicStore},
        Restructurer,
    },
};

/// Create a fresh in-memory database with every migration applied.
pub async fn setup_test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");

    Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");

    db
}

/// Grants everything to everyone.
pub struct AllowAll;

#[async_trait]
impl PermissionAuthority for AllowAll {
    async fn allowed(&self, _member: MemberId, _permission: Permission, _board: BoardId) -> bool {
        true
    }
}

/// Builds consistent forum state: board counters, topic bookkeeping and
/// member post totals are kept in step with the rows it inserts.
pub struct Fixture {
    pub db: DatabaseConnection,
}

impl Fixture {
    pub async fn new() -> Self {
        Self {
            db: setup_test_db().await,
        }
    }

    pub fn restructurer(&self) -> Restructurer {
        self.restructurer_with(RestructureSettings::default())
    }

    pub fn restructurer_with(&self, settings: RestructureSettings) -> Restructurer {
        self.restructurer_with_permissions(settings, Arc::new(AllowAll))
    }

    pub fn restructurer_with_permissions(
        &self,
        settings: RestructureSettings,
        permissions: Arc<dyn PermissionAuthority>,
    ) -> Restructurer {
        Restructurer::new(self.db.clone(), settings, permissions)
    }

    pub async fn board(&self, name: &str, counts_posts: bool) -> BoardId {
        let board = BoardActiveModel {
            id: NotSet,
            name: Set(name.to_string()),
            num_topics: Set(0),
            num_posts: Set(0),
            unapproved_topics: Set(0),
            unapproved_posts: Set(0),
            counts_posts: Set(counts_posts),
            recycle_board_id: Set(None),
        };
        Board::insert(board).exec(&self.db).await.unwrap().last_insert_id
    }

    pub async fn set_recycle_target(&self, board: BoardId, bin: BoardId) {
        Board::update_many()
            .col_expr(BoardColumn::RecycleBoardId, Expr::value(bin))
            .filter(BoardColumn::Id.eq(board))
            .exec(&self.db)
            .await
            .unwrap();
    }

    pub async fn member(&self, name: &str) -> MemberId {
        let member = MemberActiveModel {
            id: NotSet,
            name: Set(name.to_string()),
            posts: Set(0),
        };
        Member::insert(member).exec(&self.db).await.unwrap().last_insert_id
    }

    /// Inserts a topic with one message per `(poster, approved)` pair, in
    /// order, and returns the topic with its message ids.
    pub async fn topic(&self, board: BoardId, messages: &[(MemberId, bool)]) -> (TopicId, Vec<MessageId>) {
        assert!(!messages.is_empty(), "a topic needs at least one message");
        let store = TopicStore::new(self.db.clone());
        let (starter, _) = messages[0];

        // Placeholder bookkeeping until the messages exist.
        let topic = store
            .insert_topic(NewTopic {
                board,
                bookkeeping: crate::restructure::store::Bookkeeping {
                    first_msg_id: MessageId::NONE,
                    last_msg_id: MessageId::NONE,
                    num_replies: 0,
                    unapproved_posts: 0,
                    approved: false,
                },
                member_started: starter,
                member_updated: starter,
            })
            .await
            .unwrap();

        let subject = format!("Topic {topic}");
        let mut ids = Vec::with_capacity(messages.len());
        for (index, &(poster, approved)) in messages.iter().enumerate() {
            let message = MessageActiveModel {
                id: NotSet,
                topic_id: Set(topic),
                board_id: Set(board),
                approved: Set(approved),
                poster_id: Set(poster),
                subject: Set(if index == 0 {
                    subject.clone()
                } else {
                    format!("Re: {subject}")
                }),
                body: Set(format!("Message {index}")),
                poster_time: Set(Utc::now()),
                icon: Set("xx".to_string()),
            };
            let id = Message::insert(message).exec(&self.db).await.unwrap().last_insert_id;
            if !approved {
                ApprovalQueue::insert(ApprovalQueueActiveModel { msg_id: Set(id) })
                    .exec_without_returning(&self.db)
                    .await
                    .unwrap();
            }
            ids.push(id);
        }

        let stats = store.message_set_stats(topic, MessageFilter::All).await.unwrap();
        let book = store.recount_topic(topic).await.unwrap().unwrap();

        let approved_posts = stats.approved.map(|span| span.count).unwrap_or(0);
        let mut delta = BoardDelta::single_topic(book.approved);
        delta.posts = approved_posts;
        delta.unapproved_posts = book.unapproved_posts;
        Board::update_many()
            .col_expr(BoardColumn::NumTopics, Expr::col(BoardColumn::NumTopics).add(delta.topics))
            .col_expr(
                BoardColumn::UnapprovedTopics,
                Expr::col(BoardColumn::UnapprovedTopics).add(delta.unapproved_topics),
            )
            .col_expr(BoardColumn::NumPosts, Expr::col(BoardColumn::NumPosts).add(delta.posts))
            .col_expr(
                BoardColumn::UnapprovedPosts,
                Expr::col(BoardColumn::UnapprovedPosts).add(delta.unapproved_posts),
            )
            .filter(BoardColumn::Id.eq(board))
            .exec(&self.db)
            .await
            .unwrap();

        if self.board_row(board).await.counts_posts {
            for &(poster, approved) in messages {
                if approved {
                    Member::update_many()
                        .col_expr(MemberColumn::Posts, Expr::col(MemberColumn::Posts).add(1))
                        .filter(MemberColumn::Id.eq(poster))
                        .exec(&self.db)
                        .await
                        .unwrap();
                }
            }
        }

        (topic, ids)
    }

    pub async fn set_topic_flags(&self, topic: TopicId, sticky: bool, locked: i32, views: i64) {
        Topic::update_many()
            .col_expr(TopicColumn::IsSticky, Expr::value(sticky))
            .col_expr(TopicColumn::Locked, Expr::value(locked))
            .col_expr(TopicColumn::NumViews, Expr::value(views))
            .filter(TopicColumn::Id.eq(topic))
            .exec(&self.db)
            .await
            .unwrap();
    }

    /// Attaches a two-choice poll with one vote to `topic`.
    pub async fn poll(&self, topic: TopicId, question: &str) -> PollId {
        let poll = PollActiveModel {
            id: NotSet,
            question: Set(question.to_string()),
            voting_locked: Set(false),
        };
        let poll_id = Poll::insert(poll).exec(&self.db).await.unwrap().last_insert_id;

        let choices = ["Yes", "No"].into_iter().enumerate().map(|(i, label)| PollChoiceActiveModel {
            poll_id: Set(poll_id),
            choice_id: Set(ChoiceId::new(i as i64)),
            label: Set(label.to_string()),
            votes: Set(if i == 0 { 1 } else { 0 }),
        });
        PollChoice::insert_many(choices)
            .exec_without_returning(&self.db)
            .await
            .unwrap();

        let starter = self.topic_row(topic).await.member_started;
        PollVote::insert(PollVoteActiveModel {
            poll_id: Set(poll_id),
            member_id: Set(starter),
            choice_id: Set(ChoiceId::new(0)),
        })
        .exec_without_returning(&self.db)
        .await
        .unwrap();

        Topic::update_many()
            .col_expr(TopicColumn::PollId, Expr::value(poll_id))
            .filter(TopicColumn::Id.eq(topic))
            .exec(&self.db)
            .await
            .unwrap();
        poll_id
    }

    pub async fn attachment(&self, message: MessageId) -> AttachmentId {
        let attachment = AttachmentActiveModel {
            id: NotSet,
            msg_id: Set(message),
            filename: Set(format!("msg-{message}.png")),
        };
        Attachment::insert(attachment).exec(&self.db).await.unwrap().last_insert_id
    }

    pub async fn read_mark(&self, member: MemberId, topic: TopicId, last_read: MessageId) {
        LogTopic::insert(LogTopicActiveModel {
            member_id: Set(member),
            topic_id: Set(topic),
            last_read_msg_id: Set(last_read),
            unwatched: Set(false),
        })
        .exec_without_returning(&self.db)
        .await
        .unwrap();
    }

    pub async fn board_mark(&self, member: MemberId, board: BoardId, upto: MessageId) {
        BoardMarkRead::insert(BoardMarkReadActiveModel {
            member_id: Set(member),
            board_id: Set(board),
            msg_id: Set(upto),
        })
        .exec_without_returning(&self.db)
        .await
        .unwrap();
    }

    pub async fn board_seen(&self, member: MemberId, board: BoardId, upto: MessageId) {
        BoardSeen::insert(BoardSeenActiveModel {
            member_id: Set(member),
            board_id: Set(board),
            msg_id: Set(upto),
        })
        .exec_without_returning(&self.db)
        .await
        .unwrap();
    }

    pub async fn subscribe(&self, member: MemberId, topic: TopicId, sent: bool) {
        LogNotify::insert(LogNotifyActiveModel {
            id: NotSet,
            member_id: Set(member),
            topic_id: Set(Some(topic)),
            board_id: Set(None),
            sent: Set(sent),
        })
        .exec_without_returning(&self.db)
        .await
        .unwrap();
    }

    pub async fn topic_row(&self, topic: TopicId) -> TopicModel {
        Topic::find_by_id(topic).one(&self.db).await.unwrap().unwrap()
    }

    pub async fn board_row(&self, board: BoardId) -> BoardModel {
        Board::find_by_id(board).one(&self.db).await.unwrap().unwrap()
    }

    pub async fn member_row(&self, member: MemberId) -> MemberModel {
        Member::find_by_id(member).one(&self.db).await.unwrap().unwrap()
    }
}
