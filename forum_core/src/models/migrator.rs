use sea_orm_migration::prelude::*;

mod m20261018_000001_create_board_tables;
mod m20261018_000002_create_topic_tables;
mod m20261018_000003_create_ledger_tables;
mod m20261018_000004_create_content_tables;
mod m20261018_000005_create_search_tables;
mod m20261018_000006_create_audit_tables;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20261018_000001_create_board_tables::Migration),
            Box::new(m20261018_000002_create_topic_tables::Migration),
            Box::new(m20261018_000003_create_ledger_tables::Migration),
            Box::new(m20261018_000004_create_content_tables::Migration),
            Box::new(m20261018_000005_create_search_tables::Migration),
            Box::new(m20261018_000006_create_audit_tables::Migration),
        ]
    }
}

#[cfg(test)]
use sea_orm::{Database, DbErr};

#[tokio::test]
async fn test_migrations_okay() -> Result<(), DbErr> {
    let db = Database::connect("sqlite::memory:").await?;
    let schema_manager = SchemaManager::new(&db);

    Migrator::refresh(&db).await?;

    for table in [
        "board",
        "member",
        "topic",
        "message",
        "approval_queue",
        "topic_link",
        "log_topic",
        "board_mark_read",
        "board_seen",
        "log_notify",
        "reported_message",
        "calendar_event",
        "poll",
        "poll_choice",
        "poll_vote",
        "attachment",
        "message_like",
        "mention",
        "search_word",
        "search_subject",
        "moderation_log",
        "background_task",
        "forum_stat",
    ] {
        assert!(schema_manager.has_table(table).await?, "missing table {table}");
    }

    Ok(())
}
