use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

pub const TOTAL_TOPICS: &str = "total_topics";
pub const TOTAL_MESSAGES: &str = "total_messages";
pub const MAX_MSG_ID: &str = "max_msg_id";

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "forum_stat")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub name: String,
    pub value: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
