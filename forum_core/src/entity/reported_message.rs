use crate::ids::{BoardId, MessageId, ReportId, TopicId};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "reported_message")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: ReportId,
    pub msg_id: MessageId,
    pub topic_id: TopicId,
    pub board_id: BoardId,
    pub reason: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
