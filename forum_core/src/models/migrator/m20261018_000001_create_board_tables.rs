use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Board::Table)
                    .col(pk_auto(Board::Id))
                    .col(string(Board::Name))
                    .col(big_integer(Board::NumTopics))
                    .col(big_integer(Board::NumPosts))
                    .col(big_integer(Board::UnapprovedTopics))
                    .col(big_integer(Board::UnapprovedPosts))
                    .col(boolean(Board::CountsPosts))
                    .col(big_integer_null(Board::RecycleBoardId))
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Member::Table)
                    .col(pk_auto(Member::Id))
                    .col(string(Member::Name))
                    .col(big_integer(Member::Posts))
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Member::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Board::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum Board {
    Table,
    Id,
    Name,
    NumTopics,
    NumPosts,
    UnapprovedTopics,
    UnapprovedPosts,
    CountsPosts,
    RecycleBoardId,
}

#[derive(Iden)]
pub enum Member {
    Table,
    Id,
    Name,
    Posts,
}
