//! Integration tests for scroll context handling
//!
//! A fake cluster hands out scroll ids and tracks which ones are still open,
//! so each test can check that every context it opened was released.

use eyre::{Result, eyre};
use pagewalk::client::{KeepAlive, SearchClient, SearchRequest, SearchResponse};
use pagewalk::{CountedIterator, ScrollIterator};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::HashMap;

/// Serves an index of documents, `size` at a time, through scroll contexts
struct FakeCluster {
    docs: Vec<Value>,
    /// Open scroll id -> position of the next page
    open: HashMap<String, usize>,
    opened: usize,
    fail_after: Option<usize>,
    scroll_calls: usize,
}

impl FakeCluster {
    fn new(count: usize) -> Self {
        let docs = (0..count)
            .map(|i| json!({"_id": format!("doc-{}", i), "_source": {"n": i}}))
            .collect();
        Self {
            docs,
            open: HashMap::new(),
            opened: 0,
            fail_after: None,
            scroll_calls: 0,
        }
    }

    fn page(&mut self, id: String, from: usize, size: usize) -> SearchResponse {
        let hits: Vec<Value> = self.docs.iter().skip(from).take(size).cloned().collect();
        self.open.insert(id.clone(), from + hits.len());
        SearchResponse::new(Some(&id), self.docs.len() as u64, hits)
    }
}

const PAGE_SIZE: usize = 3;

impl SearchClient for FakeCluster {
    fn search(&mut self, request: &SearchRequest) -> Result<SearchResponse> {
        let size = request
            .body
            .get("size")
            .and_then(Value::as_u64)
            .map(|size| size as usize)
            .unwrap_or(PAGE_SIZE);
        self.opened += 1;
        let id = format!("ctx-{}", self.opened);
        Ok(self.page(id, 0, size))
    }

    fn scroll(&mut self, scroll_id: &str, _keep_alive: KeepAlive) -> Result<SearchResponse> {
        self.scroll_calls += 1;
        if self.fail_after.is_some_and(|limit| self.scroll_calls > limit) {
            return Err(eyre!("node left the cluster"));
        }
        let from = *self
            .open
            .get(scroll_id)
            .ok_or_else(|| eyre!("No search context found for id [{}]", scroll_id))?;
        Ok(self.page(scroll_id.to_string(), from, PAGE_SIZE))
    }

    fn clear_scroll(&mut self, scroll_id: &str) -> Result<bool> {
        Ok(self.open.remove(scroll_id).is_some())
    }
}

#[derive(Debug, Deserialize, PartialEq)]
struct Numbered {
    n: u64,
}

#[test]
fn test_scroll_to_exhaustion_releases_context() {
    let mut cluster = FakeCluster::new(10);
    {
        let mut iter = ScrollIterator::sources(&mut cluster).batch_size(PAGE_SIZE);
        iter.prepare_search(["numbers"]);

        let sources: Vec<Value> = iter.elements().collect::<Result<_>>().unwrap();
        assert_eq!(sources.len(), 10);
        assert_eq!(sources[9], json!({"n": 9}));
        assert_eq!(iter.count(), 10);
        assert_eq!(iter.total_size(), Some(10));
        assert!(iter.scroll_id().is_none());
    }
    assert!(cluster.open.is_empty());
    assert_eq!(cluster.opened, 1);
}

#[test]
fn test_deserialize_sources() {
    let mut cluster = FakeCluster::new(4);
    let mut iter = ScrollIterator::<_, Numbered>::deserialize(&mut cluster);
    iter.prepare_search(["numbers"]);
    let numbers: Vec<u64> = iter
        .elements()
        .map(|doc| doc.map(|d| d.n))
        .collect::<Result<_>>()
        .unwrap();
    assert_eq!(numbers, vec![0, 1, 2, 3]);
    drop(iter);
    assert!(cluster.open.is_empty());
}

#[test]
fn test_abandon_and_close() {
    let mut cluster = FakeCluster::new(10);
    {
        let mut iter = ScrollIterator::new(&mut cluster).batch_size(PAGE_SIZE);
        iter.prepare_search(["numbers"]);
        for _ in 0..4 {
            assert!(iter.has_next().unwrap());
            iter.next().unwrap();
        }
        assert!(iter.scroll_id().is_some());

        iter.close().unwrap();
        assert!(iter.scroll_id().is_none());
        assert!(!iter.has_next().unwrap());

        // Closing twice does nothing
        iter.close().unwrap();
    }
    assert!(cluster.open.is_empty());
}

#[test]
fn test_abandon_and_drop() {
    let mut cluster = FakeCluster::new(10);
    {
        let mut iter = ScrollIterator::new(&mut cluster).batch_size(PAGE_SIZE);
        iter.prepare_search(["numbers"]);
        assert!(iter.has_next().unwrap());
        iter.next().unwrap();
    }
    assert!(cluster.open.is_empty());
    assert_eq!(cluster.opened, 1);
}

#[test]
fn test_failure_mid_scroll_releases_context() {
    let mut cluster = FakeCluster::new(10);
    cluster.fail_after = Some(1);
    {
        let mut iter = ScrollIterator::new(&mut cluster).batch_size(PAGE_SIZE);
        iter.prepare_search(["numbers"]);

        let results: Vec<Result<Value>> = iter.elements().collect();
        assert_eq!(results.len(), 7);
        assert!(results[..6].iter().all(|r| r.is_ok()));
        assert!(results[6].is_err());

        assert!(!iter.has_next().unwrap());
        assert_eq!(iter.count(), 6);
    }
    assert!(cluster.open.is_empty());
}

#[test]
fn test_decorated_scroll_closes_through_the_chain() {
    let mut cluster = FakeCluster::new(10);
    {
        let mut scroll = ScrollIterator::sources(&mut cluster).batch_size(PAGE_SIZE);
        scroll.prepare_search(["numbers"]);
        let mut iter = scroll.skipping().max_offset(2, Some(3));

        let sources: Vec<Value> = iter.elements().collect::<Result<_>>().unwrap();
        assert_eq!(sources, vec![json!({"n": 2}), json!({"n": 3}), json!({"n": 4})]);
        iter.close().unwrap();
    }
    assert!(cluster.open.is_empty());
}
