use crate::ids::{BoardId, MemberId, MessageId};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// "Mark board read" watermark: every message up to `msg_id` on the board
/// counts as read for the member.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "board_mark_read")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub member_id: MemberId,
    #[sea_orm(primary_key, auto_increment = false)]
    pub board_id: BoardId,
    pub msg_id: MessageId,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
