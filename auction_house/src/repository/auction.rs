use std::sync::Arc;

use model::domain::auction::Auction;
use model::AuctionId;
use tokio::sync::Mutex;

/// Every auction created by this node, each behind its own lock so bids on
/// different auctions never wait on each other.
#[derive(Debug, Default)]
pub struct AuctionStore {
    database: dashmap::DashMap<AuctionId, Arc<Mutex<Auction>>>,
}

impl AuctionStore {
    pub fn new() -> Self { Self::default() }

    pub fn insert(&self, auction: Auction) -> Arc<Mutex<Auction>> {
        let id = auction.id.clone();
        let entry = Arc::new(Mutex::new(auction));
        self.database.insert(id, entry.clone());
        entry
    }

    pub fn get(&self, id: &AuctionId) -> Option<Arc<Mutex<Auction>>> {
        self.database.get(id).map(|entry| entry.value().clone())
    }

    /// Copies of the stored auctions, oldest first.
    pub async fn snapshot(&self) -> Vec<Auction> {
        // Collect the handles first, the map guards must not be held across
        // an await
        let entries: Vec<_> =
            self.database.iter().map(|entry| entry.value().clone()).collect();
        let mut auctions = Vec::with_capacity(entries.len());
        for entry in entries {
            auctions.push(entry.lock().await.clone());
        }
        auctions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        auctions
    }

    #[cfg(test)]
    pub fn len(&self) -> usize { self.database.len() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn auction(offset: i64) -> Auction {
        let now = Utc::now() + Duration::milliseconds(offset);
        Auction::open(
            "http://jobs.example/jobs/1".to_string(),
            "testJob".to_string(),
            now + Duration::seconds(10),
            now,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_snapshot_is_ordered_by_creation() {
        let store = AuctionStore::new();
        let late = auction(50);
        let early = auction(0);
        store.insert(late.clone());
        store.insert(early.clone());

        let ids: Vec<_> =
            store.snapshot().await.into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![early.id, late.id]);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_get_shares_the_same_lock() {
        let store = AuctionStore::new();
        let auction = auction(0);
        let id = auction.id.clone();
        let first = store.insert(auction);
        let second = store.get(&id).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(store.get(&AuctionId::new_random()).is_none());
    }
}
