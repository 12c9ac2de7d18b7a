use crate::ids::BoardId;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "board")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: BoardId,
    pub name: String,
    pub num_topics: i64,
    pub num_posts: i64,
    pub unapproved_topics: i64,
    pub unapproved_posts: i64,
    /// Whether posting here adds to a member's global post total.
    pub counts_posts: bool,
    /// Where topics removed from this board are recycled to.
    pub recycle_board_id: Option<BoardId>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::topic::Entity")]
    Topic,
}

impl Related<super::topic::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Topic.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
