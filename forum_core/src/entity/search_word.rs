use crate::ids::{MessageId, WordId};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Custom full-text index entry.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "search_word")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub word_id: WordId,
    #[sea_orm(primary_key, auto_increment = false)]
    pub msg_id: MessageId,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
