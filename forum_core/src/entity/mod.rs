// SeaORM entities, one module per table.

pub mod approval_queue;
pub mod attachment;
pub mod background_task;
pub mod board;
pub mod board_mark_read;
pub mod board_seen;
pub mod calendar_event;
pub mod forum_stat;
pub mod log_notify;
pub mod log_topic;
pub mod member;
pub mod mention;
pub mod message;
pub mod message_like;
pub mod moderation_log;
pub mod poll;
pub mod poll_choice;
pub mod poll_vote;
pub mod reported_message;
pub mod search_subject;
pub mod search_word;
pub mod topic;
pub mod topic_link;


pub mod prelude {
    // Re-export all entities for convenience
    pub use super::approval_queue::{
        ActiveModel as ApprovalQueueActiveModel, Column as ApprovalQueueColumn, Entity as ApprovalQueue,
        Model as ApprovalQueueModel,
    };
    pub use super::attachment::{
        ActiveModel as AttachmentActiveModel, Column as AttachmentColumn, Entity as Attachment,
        Model as AttachmentModel,
    };
    pub use super::background_task::{
        ActiveModel as BackgroundTaskActiveModel, Column as BackgroundTaskColumn, Entity as BackgroundTask,
        Model as BackgroundTaskModel,
    };
    pub use super::board::{
        ActiveModel as BoardActiveModel, Column as BoardColumn, Entity as Board,
        Model as BoardModel,
    };
    pub use super::board_mark_read::{
        ActiveModel as BoardMarkReadActiveModel, Column as BoardMarkReadColumn, Entity as BoardMarkRead,
        Model as BoardMarkReadModel,
    };
    pub use super::board_seen::{
        ActiveModel as BoardSeenActiveModel, Column as BoardSeenColumn, Entity as BoardSeen,
        Model as BoardSeenModel,
    };
    pub use super::calendar_event::{
        ActiveModel as CalendarEventActiveModel, Column as CalendarEventColumn, Entity as CalendarEvent,
        Model as CalendarEventModel,
    };
    pub use super::forum_stat::{
        ActiveModel as ForumStatActiveModel, Column as ForumStatColumn, Entity as ForumStat,
        Model as ForumStatModel,
    };
    pub use super::log_notify::{
        ActiveModel as LogNotifyActiveModel, Column as LogNotifyColumn, Entity as LogNotify,
        Model as LogNotifyModel,
    };
    pub use super::log_topic::{
        ActiveModel as LogTopicActiveModel, Column as LogTopicColumn, Entity as LogTopic,
        Model as LogTopicModel,
    };
    pub use super::member::{
        ActiveModel as MemberActiveModel, Column as MemberColumn, Entity as Member,
        Model as MemberModel,
    };
    pub use super::mention::{
        ActiveModel as MentionActiveModel, Column as MentionColumn, Entity as Mention,
        Model as MentionModel,
    };
    pub use super::message::{
        ActiveModel as MessageActiveModel, Column as MessageColumn, Entity as Message,
        Model as MessageModel,
    };
    pub use super::message_like::{
        ActiveModel as MessageLikeActiveModel, Column as MessageLikeColumn, Entity as MessageLike,
        Model as MessageLikeModel,
    };
    pub use super::moderation_log::{
        ActiveModel as ModerationLogActiveModel, Column as ModerationLogColumn, Entity as ModerationLog,
        Model as ModerationLogModel,
    };
    pub use super::poll::{
        ActiveModel as PollActiveModel, Column as PollColumn, Entity as Poll,
        Model as PollModel,
    };
    pub use super::poll_choice::{
        ActiveModel as PollChoiceActiveModel, Column as PollChoiceColumn, Entity as PollChoice,
        Model as PollChoiceModel,
    };
    pub use super::poll_vote::{
        ActiveModel as PollVoteActiveModel, Column as PollVoteColumn, Entity as PollVote,
        Model as PollVoteModel,
    };
    pub use super::reported_message::{
        ActiveModel as ReportedMessageActiveModel, Column as ReportedMessageColumn, Entity as ReportedMessage,
        Model as ReportedMessageModel,
    };
    pub use super::search_subject::{
        ActiveModel as SearchSubjectActiveModel, Column as SearchSubjectColumn, Entity as SearchSubject,
        Model as SearchSubjectModel,
    };
    pub use super::search_word::{
        ActiveModel as SearchWordActiveModel, Column as SearchWordColumn, Entity as SearchWord,
        Model as SearchWordModel,
    };
    pub use super::topic::{
        ActiveModel as TopicActiveModel, Column as TopicColumn, Entity as Topic,
        Model as TopicModel,
    };
    pub use super::topic_link::{
        ActiveModel as TopicLinkActiveModel, Column as TopicLinkColumn, Entity as TopicLink,
        Model as TopicLinkModel,
    };

    // Re-export commonly used SeaORM types and traits
    pub use sea_orm::{
        ActiveModelTrait,
        ActiveValue,

        ColumnTrait,
        ConnectionTrait,

        // Database and connection types
        Database,
        DatabaseConnection,
        DbConn,
        // Common result types
        DbErr,

        // Core traits
        EntityTrait,
        ModelTrait,
        NotSet,
        PaginatorTrait,
        QueryFilter,
        QueryOrder,
        QuerySelect,
        // Active model helpers
        Set,
    };
}
