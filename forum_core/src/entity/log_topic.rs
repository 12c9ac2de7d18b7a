use crate::ids::{MemberId, MessageId, TopicId};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Per-member read mark inside one topic.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "log_topic")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub member_id: MemberId,
    #[sea_orm(primary_key, auto_increment = false)]
    pub topic_id: TopicId,
    pub last_read_msg_id: MessageId,
    pub unwatched: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
