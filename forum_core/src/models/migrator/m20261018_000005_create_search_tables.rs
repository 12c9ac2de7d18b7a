use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SearchWord::Table)
                    .col(big_integer(SearchWord::WordId))
                    .col(big_integer(SearchWord::MsgId))
                    .primary_key(
                        Index::create()
                            .col(SearchWord::WordId)
                            .col(SearchWord::MsgId),
                    )
                    .to_owned(),
            )
            .await?;

        // Create index on msg_id, deletes go by message
        manager
            .create_index(
                Index::create()
                    .name("idx_search_word_msg_id")
                    .table(SearchWord::Table)
                    .col(SearchWord::MsgId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(SearchSubject::Table)
                    .col(string(SearchSubject::Word))
                    .col(big_integer(SearchSubject::TopicId))
                    .primary_key(
                        Index::create()
                            .col(SearchSubject::Word)
                            .col(SearchSubject::TopicId),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SearchSubject::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(SearchWord::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum SearchWord {
    Table,
    WordId,
    MsgId,
}

#[derive(Iden)]
enum SearchSubject {
    Table,
    Word,
    TopicId,
}
