use crate::ids::{BoardId, MemberId, TopicId};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Subscription to either a topic or a board.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "log_notify")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub member_id: MemberId,
    pub topic_id: Option<TopicId>,
    pub board_id: Option<BoardId>,
    /// A digest already went out for this subscription.
    pub sent: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
