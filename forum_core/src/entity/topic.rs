use crate::ids::{BoardId, MemberId, MessageId, PollId, TopicId};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

pub const UNLOCKED: i32 = 0;
pub const LOCKED_BY_MODERATOR: i32 = 1;
pub const LOCKED_BY_OWNER: i32 = 2;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "topic")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: TopicId,
    pub board_id: BoardId,
    pub first_msg_id: MessageId,
    pub last_msg_id: MessageId,
    pub num_replies: i64,
    pub unapproved_posts: i64,
    pub approved: bool,
    pub is_sticky: bool,
    pub locked: i32,
    /// Board the topic lived on before it was recycled.
    pub previous_board_id: Option<BoardId>,
    pub member_started: MemberId,
    pub member_updated: MemberId,
    pub poll_id: Option<PollId>,
    pub num_views: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::board::Entity",
        from = "Column::BoardId",
        to = "super::board::Column::Id"
    )]
    Board,
    #[sea_orm(has_many = "super::message::Entity")]
    Message,
}

impl Related<super::board::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Board.def()
    }
}

impl Related<super::message::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Message.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
