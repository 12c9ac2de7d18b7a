//! Topic notification subscriptions (`log_notify` rows with a topic id).

use std::collections::BTreeMap;

use sea_orm::DatabaseConnection;

use crate::{
    entity::prelude::*,
    error::RestructureError,
    ids::{MemberId, TopicId},
};

use super::batch::{Batches, Budget};

/// One subscription per member; `sent` survives when any source had it set,
/// so merged subscribers are not mailed twice for the same digest.
pub fn collapse_subscriptions(rows: &[LogNotifyModel]) -> BTreeMap<MemberId, bool> {
    let mut merged: BTreeMap<MemberId, bool> = BTreeMap::new();
    for row in rows {
        let sent = merged.entry(row.member_id).or_insert(false);
        *sent |= row.sent;
    }
    merged
}

#[derive(Clone)]
pub struct NotificationLedger {
    db: DatabaseConnection,
    batch_size: usize,
}

impl NotificationLedger {
    pub fn new(db: DatabaseConnection, batch_size: usize) -> Self {
        Self { db, batch_size }
    }

    pub async fn subscriptions(&self, topics: &[TopicId]) -> Result<Vec<LogNotifyModel>, DbErr> {
        if topics.is_empty() {
            return Ok(Vec::new());
        }
        LogNotify::find()
            .filter(LogNotifyColumn::TopicId.is_in(topics.iter().copied()))
            .order_by_asc(LogNotifyColumn::Id)
            .all(&self.db)
            .await
    }

    async fn subscribe_all(
        &self,
        topic: TopicId,
        members: Vec<(MemberId, bool)>,
        budget: &Budget,
    ) -> Result<usize, RestructureError> {
        let total = members.len();
        let mut batches = Batches::new(members, self.batch_size);
        while let Some(chunk) = batches.next_batch(budget)? {
            let rows = chunk.iter().map(|&(member, sent)| LogNotifyActiveModel {
                id: NotSet,
                member_id: Set(member),
                topic_id: Set(Some(topic)),
                board_id: Set(None),
                sent: Set(sent),
            });
            LogNotify::insert_many(rows)
                .exec_without_returning(&self.db)
                .await?;
        }
        Ok(total)
    }

    /// Subscribers of `from` also follow `to`. Members already subscribed to
    /// `to` are left alone.
    pub async fn copy_topic_subscriptions(
        &self,
        from: TopicId,
        to: TopicId,
        budget: &Budget,
    ) -> Result<usize, RestructureError> {
        let already: Vec<MemberId> = self
            .subscriptions(&[to])
            .await?
            .into_iter()
            .map(|row| row.member_id)
            .collect();

        let members: Vec<(MemberId, bool)> = self
            .subscriptions(&[from])
            .await?
            .into_iter()
            .filter(|row| !already.contains(&row.member_id))
            .map(|row| (row.member_id, row.sent))
            .collect();

        self.subscribe_all(to, members, budget).await
    }

    /// Replaces the subscriptions of `topics` with one per member on `survivor`.
    pub async fn collapse(
        &self,
        topics: &[TopicId],
        survivor: TopicId,
        budget: &Budget,
    ) -> Result<usize, RestructureError> {
        let rows = self.subscriptions(topics).await?;
        let merged = collapse_subscriptions(&rows);

        let written = self
            .subscribe_all(survivor, merged.into_iter().collect(), budget)
            .await?;
        // Only the rows read above; the fresh ones on `survivor` stay.
        let replaced: Vec<i64> = rows.iter().map(|row| row.id).collect();
        let mut batches = Batches::new(replaced, self.batch_size);
        while let Some(chunk) = batches.next_batch(&Budget::unbounded())? {
            LogNotify::delete_many()
                .filter(LogNotifyColumn::Id.is_in(chunk.iter().copied()))
                .exec(&self.db)
                .await?;
        }
        Ok(written)
    }

    pub async fn purge(&self, topics: &[TopicId]) -> Result<u64, DbErr> {
        if topics.is_empty() {
            return Ok(0);
        }
        let result = LogNotify::delete_many()
            .filter(LogNotifyColumn::TopicId.is_in(topics.iter().copied()))
            .exec(&self.db)
            .await?;
        Ok(result.rows_affected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::Fixture;

    #[tokio::test]
    async fn test_collapse_keeps_sent_flag() {
        let fx = Fixture::new().await;
        let board = fx.board("General", true).await;
        let alice = fx.member("alice").await;
        let bob = fx.member("bob").await;
        let (t1, _) = fx.topic(board, &[(alice, true)]).await;
        let (t2, _) = fx.topic(board, &[(alice, true)]).await;
        fx.subscribe(alice, t1, false).await;
        fx.subscribe(alice, t2, true).await;
        fx.subscribe(bob, t2, false).await;

        let ledger = NotificationLedger::new(fx.db.clone(), 500);
        ledger.collapse(&[t1, t2], t1, &Budget::unbounded()).await.unwrap();

        let rows = ledger.subscriptions(&[t1, t2]).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.topic_id == Some(t1)));
        let alice_row = rows.iter().find(|row| row.member_id == alice).unwrap();
        assert!(alice_row.sent);
    }

    #[tokio::test]
    async fn test_collapse_can_be_rerun() {
        let fx = Fixture::new().await;
        let board = fx.board("General", true).await;
        let alice = fx.member("alice").await;
        let bob = fx.member("bob").await;
        let (t1, _) = fx.topic(board, &[(alice, true)]).await;
        let (t2, _) = fx.topic(board, &[(alice, true)]).await;
        fx.subscribe(alice, t2, true).await;
        fx.subscribe(bob, t2, false).await;

        let ledger = NotificationLedger::new(fx.db.clone(), 1);
        let spent = Budget::until(std::time::Instant::now() - std::time::Duration::from_millis(1));
        let err = ledger.collapse(&[t1, t2], t1, &spent).await.unwrap_err();
        assert!(matches!(err, RestructureError::DeadlineExceeded));
        assert_eq!(ledger.subscriptions(&[t2]).await.unwrap().len(), 2);

        // A first attempt that got as far as alice's row on the survivor.
        fx.subscribe(alice, t1, true).await;

        ledger.collapse(&[t1, t2], t1, &Budget::unbounded()).await.unwrap();
        let rows = ledger.subscriptions(&[t1, t2]).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|row| row.topic_id == Some(t1)));
        assert!(rows.iter().find(|row| row.member_id == alice).unwrap().sent);
        assert!(!rows.iter().find(|row| row.member_id == bob).unwrap().sent);
    }

    #[tokio::test]
    async fn test_copy_skips_existing_subscribers() {
        let fx = Fixture::new().await;
        let board = fx.board("General", true).await;
        let alice = fx.member("alice").await;
        let bob = fx.member("bob").await;
        let (t1, _) = fx.topic(board, &[(alice, true)]).await;
        let (t2, _) = fx.topic(board, &[(alice, true)]).await;
        fx.subscribe(alice, t1, false).await;
        fx.subscribe(bob, t1, false).await;
        fx.subscribe(bob, t2, false).await;

        let ledger = NotificationLedger::new(fx.db.clone(), 500);
        let copied = ledger
            .copy_topic_subscriptions(t1, t2, &Budget::unbounded())
            .await
            .unwrap();

        assert_eq!(copied, 1);
        assert_eq!(ledger.subscriptions(&[t2]).await.unwrap().len(), 2);
    }
}
