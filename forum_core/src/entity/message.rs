use crate::ids::{BoardId, MemberId, MessageId, TopicId};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Icon given to messages moved into the recycle bin. Their posters have
/// already lost the post count for them.
pub const RECYCLED_ICON: &str = "recycled";

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "message")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: MessageId,
    pub topic_id: TopicId,
    pub board_id: BoardId,
    pub approved: bool,
    pub poster_id: MemberId,
    pub subject: String,
    pub body: String,
    pub poster_time: DateTimeUtc,
    pub icon: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::topic::Entity",
        from = "Column::TopicId",
        to = "super::topic::Column::Id"
    )]
    Topic,
}

impl Related<super::topic::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Topic.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
