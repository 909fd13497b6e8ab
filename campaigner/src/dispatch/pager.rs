//! Cursor-paginated reader over eligible subscribers.
//!
//! Keyset paging on the subscriber id: the cursor starts below every real
//! id and advances to the largest id seen in each page, so progress is
//! strictly forward and no subscriber is served twice within a run.

use anyhow::Result;
use tracing::debug;

use crate::store::types::Subscriber;
use crate::store::SubscriberStore;

pub struct SubscriberPager<'a> {
    store: &'a dyn SubscriberStore,
    list_ids: &'a [i64],
    user_id: i64,
    page_size: i64,
    cursor: i64,
}

impl<'a> SubscriberPager<'a> {
    pub fn new(
        store: &'a dyn SubscriberStore,
        list_ids: &'a [i64],
        user_id: i64,
        page_size: i64,
    ) -> Self {
        SubscriberPager {
            store,
            list_ids,
            user_id,
            page_size,
            cursor: 0,
        }
    }

    /// Fetch the next page. An empty page means the run is exhausted.
    pub async fn next_page(&mut self) -> Result<Vec<Subscriber>> {
        let page = self
            .store
            .fetch_eligible(self.list_ids, self.user_id, self.cursor, self.page_size)
            .await?;

        if let Some(last) = page.last() {
            self.cursor = last.id;
        }

        debug!(
            user_id = self.user_id,
            cursor = self.cursor,
            page_len = page.len(),
            "page_fetched"
        );

        Ok(page)
    }

    pub fn cursor(&self) -> i64 {
        self.cursor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct VecStore {
        subscribers: Vec<Subscriber>,
    }

    #[async_trait]
    impl SubscriberStore for VecStore {
        async fn fetch_eligible(
            &self,
            _list_ids: &[i64],
            _user_id: i64,
            cursor: i64,
            page_size: i64,
        ) -> Result<Vec<Subscriber>> {
            Ok(self
                .subscribers
                .iter()
                .filter(|s| s.id > cursor)
                .take(page_size as usize)
                .cloned()
                .collect())
        }
    }

    fn store(count: i64) -> VecStore {
        VecStore {
            subscribers: (1..=count)
                .map(|id| Subscriber {
                    id,
                    user_id: 1,
                    name: String::new(),
                    email: format!("sub{id}@example.com"),
                    metadata: String::new(),
                    active: true,
                    blacklisted: false,
                })
                .collect(),
        }
    }

    #[tokio::test]
    async fn test_cursor_advances_to_max_id() {
        let store = store(25);
        let lists = [1];
        let mut pager = SubscriberPager::new(&store, &lists, 1, 10);

        let page = pager.next_page().await.unwrap();
        assert_eq!(page.len(), 10);
        assert_eq!(pager.cursor(), 10);

        let page = pager.next_page().await.unwrap();
        assert_eq!(page.first().unwrap().id, 11);
        assert_eq!(pager.cursor(), 20);
    }

    #[tokio::test]
    async fn test_pages_are_disjoint_and_ascending() {
        let store = store(95);
        let lists = [1];
        let mut pager = SubscriberPager::new(&store, &lists, 1, 10);

        let mut last_seen = 0;
        loop {
            let page = pager.next_page().await.unwrap();
            if page.is_empty() {
                break;
            }
            for sub in &page {
                assert!(sub.id > last_seen);
                last_seen = sub.id;
            }
        }
        assert_eq!(last_seen, 95);
    }

    #[tokio::test]
    async fn test_empty_store_terminates_immediately() {
        let store = store(0);
        let lists = [1];
        let mut pager = SubscriberPager::new(&store, &lists, 1, 10);

        assert!(pager.next_page().await.unwrap().is_empty());
        assert_eq!(pager.cursor(), 0);
    }
}
