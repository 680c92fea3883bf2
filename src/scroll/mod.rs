//! Iterate the complete result of a search with the scroll API
//!
//! [`ScrollIterator`] opens a scroll context with the first search, pages
//! through it one response at a time and clears the context as soon as it is
//! no longer needed: on exhaustion, on a failed continuation, on
//! [`CountedIterator::close`] and on drop.
//!
//! ```no_run
//! use pagewalk::client::{Auth, HttpSearchClient};
//! use pagewalk::iter::CountedIterator;
//! use pagewalk::scroll::ScrollIterator;
//! use serde_json::json;
//! use std::time::Duration;
//! use url::Url;
//!
//! # fn example() -> eyre::Result<()> {
//! let url = Url::parse("http://localhost:9200")?;
//! let client = HttpSearchClient::try_new(url, Auth::None, Duration::from_secs(30))?;
//! let mut iter = ScrollIterator::sources(client);
//! iter.prepare_search(["media"])
//!     .insert("query".to_string(), json!({"term": {"type": "CLIP"}}));
//! while iter.has_next()? {
//!     let source = iter.next()?;
//!     println!("{}", source);
//! }
//! # Ok(())
//! # }
//! ```

use crate::client::{
    KeepAlive, SearchClient, SearchRequest, SearchResponse, TotalHits, TotalRelation,
};
use crate::error::IterError;
use crate::iter::CountedIterator;
use eyre::{Result, WrapErr, eyre};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::time::{Duration, Instant};

type Adapter<T> = Box<dyn FnMut(Value) -> Result<T>>;

pub struct ScrollIterator<C: SearchClient, T = Value> {
    client: C,
    adapt: Adapter<T>,
    request: Option<SearchRequest>,
    keep_alive: KeepAlive,
    batch_size: Option<usize>,
    routing: Vec<String>,
    hits: Vec<Value>,
    index: usize,
    scroll_id: Option<String>,
    total: Option<TotalHits>,
    started: bool,
    exhausted: bool,
    checked_sort: bool,
    count: u64,
    client_duration: Duration,
}

impl<C: SearchClient> ScrollIterator<C, Value> {
    /// Yields the complete hits, metadata included
    pub fn new(client: C) -> Self {
        Self::with_adapter(client, Ok)
    }

    /// Yields the `_source` of every hit
    pub fn sources(client: C) -> Self {
        Self::with_adapter(client, |mut hit| {
            hit.get_mut("_source")
                .map(Value::take)
                .ok_or_else(|| eyre!("Hit {} has no _source", hit_id(&hit)))
        })
    }
}

impl<C: SearchClient, T: DeserializeOwned> ScrollIterator<C, T> {
    /// Deserializes the `_source` of every hit into `T`
    pub fn deserialize(client: C) -> Self {
        Self::with_adapter(client, |mut hit| {
            let source = hit
                .get_mut("_source")
                .map(Value::take)
                .ok_or_else(|| eyre!("Hit {} has no _source", hit_id(&hit)))?;
            serde_json::from_value(source)
                .wrap_err_with(|| format!("Failed to deserialize hit {}", hit_id(&hit)))
        })
    }
}

fn hit_id(hit: &Value) -> &str {
    hit.get("_id").and_then(Value::as_str).unwrap_or("<unknown>")
}

impl<C: SearchClient, T> ScrollIterator<C, T> {
    /// Converts every hit with `adapt`
    ///
    /// A failing `adapt` fails the `next()` call for that hit only; the hit is
    /// counted and iteration may continue.
    pub fn with_adapter<F>(client: C, adapt: F) -> Self
    where
        F: FnMut(Value) -> Result<T> + 'static,
    {
        Self {
            client,
            adapt: Box::new(adapt),
            request: None,
            keep_alive: KeepAlive::default(),
            batch_size: None,
            routing: Vec::new(),
            hits: Vec::new(),
            index: 0,
            scroll_id: None,
            total: None,
            started: false,
            exhausted: false,
            checked_sort: false,
            count: 0,
            client_duration: Duration::ZERO,
        }
    }

    pub fn keep_alive(mut self, keep_alive: KeepAlive) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Number of hits per response, unless the body sets `size` itself
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    pub fn routing<S: Into<String>>(mut self, routing: impl IntoIterator<Item = S>) -> Self {
        self.routing = routing.into_iter().map(Into::into).collect();
        self
    }

    /// Start a new search request on `indices` and return its body for editing
    ///
    /// Only the request prepared before the first `has_next()` is used.
    pub fn prepare_search<S: Into<String>>(
        &mut self,
        indices: impl IntoIterator<Item = S>,
    ) -> &mut Map<String, Value> {
        let mut request = SearchRequest::new(indices);
        request.keep_alive = self.keep_alive;
        request.routing = self.routing.clone();
        &mut self.request.insert(request).body
    }

    /// Use a complete request instead of [`Self::prepare_search`]
    pub fn with_request(mut self, request: SearchRequest) -> Self {
        self.keep_alive = request.keep_alive;
        self.request = Some(request);
        self
    }

    pub fn request(&self) -> Option<&SearchRequest> {
        self.request.as_ref()
    }

    /// The scroll context currently held open, if any
    pub fn scroll_id(&self) -> Option<&str> {
        self.scroll_id.as_deref()
    }

    /// Whether the total hit count is exact or a lower bound
    pub fn total_relation(&self) -> Option<TotalRelation> {
        self.total.map(|total| total.relation())
    }

    /// Time spent waiting for the search client
    pub fn client_duration(&self) -> Duration {
        self.client_duration
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    fn find_next(&mut self) -> Result<bool> {
        if self.index < self.hits.len() {
            return Ok(true);
        }
        if self.exhausted {
            return Ok(false);
        }
        if self.request.is_none() {
            return Err(IterError::NotPrepared.into());
        }
        let result = if self.started {
            self.next_batch()
        } else {
            self.first_batch()
        };
        if let Err(e) = result {
            self.finish();
            return Err(e);
        }
        if self.index >= self.hits.len() {
            self.finish();
        }
        Ok(self.index < self.hits.len())
    }

    fn first_batch(&mut self) -> Result<()> {
        self.started = true;
        let request = self.request.as_mut().ok_or(IterError::NotPrepared)?;
        if !request.body.contains_key("sort") {
            log::debug!("No explicit sort given, sorting on _doc");
            request.body.insert("sort".to_string(), json!(["_doc"]));
        }
        if let Some(batch_size) = self.batch_size
            && !request.body.contains_key("size")
        {
            request.body.insert("size".to_string(), json!(batch_size));
        }
        let started = Instant::now();
        let response = self.client.search(request);
        self.client_duration += started.elapsed();
        let response = response.wrap_err_with(|| {
            format!(
                "Search on {} failed for request {}",
                request.index_path(),
                Value::Object(request.body.clone())
            )
        })?;
        if let Some(total) = response.hits.total {
            self.total = Some(total);
        }
        self.accept(response);
        Ok(())
    }

    fn next_batch(&mut self) -> Result<()> {
        let Some(scroll_id) = self.scroll_id.clone() else {
            log::warn!("No scroll id found, so not possible to scroll next batch");
            self.hits.clear();
            self.index = 0;
            return Ok(());
        };
        if !self.checked_sort {
            self.checked_sort = true;
            self.check_sort();
        }
        let started = Instant::now();
        let response = self.client.scroll(&scroll_id, self.keep_alive);
        self.client_duration += started.elapsed();
        let response =
            response.wrap_err_with(|| format!("Scroll after {} hit(s) failed", self.count))?;
        self.accept(response);
        Ok(())
    }

    fn check_sort(&self) {
        let sort = self.request.as_ref().and_then(|r| r.body.get("sort"));
        let first = match sort {
            Some(Value::Array(fields)) => fields.first(),
            other => other,
        };
        if first.and_then(Value::as_str) != Some("_doc") {
            log::warn!(
                "Not sorting on _doc (but on {}), which makes scrolling slower",
                sort.map(Value::to_string).unwrap_or_default()
            );
        }
    }

    fn accept(&mut self, response: SearchResponse) {
        if let Some(new_id) = response.scroll_id
            && self.scroll_id.as_deref() != Some(new_id.as_str())
        {
            match &self.scroll_id {
                None => log::debug!("Scroll id {}", new_id),
                Some(old_id) => log::info!("New scroll id {} (was {})", new_id, old_id),
            }
            self.scroll_id = Some(new_id);
        }
        self.hits = response.hits.hits;
        self.index = 0;
    }

    /// Mark exhausted and clear the scroll context, logging a failure
    fn finish(&mut self) {
        self.exhausted = true;
        self.hits.clear();
        self.index = 0;
        if let Err(e) = self.release() {
            log::warn!("{:#}", e);
        }
    }

    fn release(&mut self) -> Result<()> {
        let Some(scroll_id) = self.scroll_id.take() else {
            return Ok(());
        };
        let started = Instant::now();
        let result = self.client.clear_scroll(&scroll_id);
        self.client_duration += started.elapsed();
        match result {
            Ok(true) => log::debug!("Cleared scroll {}", scroll_id),
            Ok(false) => log::debug!("Scroll {} was already gone", scroll_id),
            Err(e) => return Err(e.wrap_err(format!("Failed to clear scroll {}", scroll_id))),
        }
        Ok(())
    }
}

impl<C: SearchClient, T> CountedIterator for ScrollIterator<C, T> {
    type Item = T;

    fn has_next(&mut self) -> Result<bool> {
        self.find_next()
    }

    fn next(&mut self) -> Result<Self::Item> {
        if !self.find_next()? {
            return Err(IterError::Exhausted.into());
        }
        let hit = self
            .hits
            .get_mut(self.index)
            .map(Value::take)
            .ok_or(IterError::Exhausted)?;
        self.index += 1;
        self.count += 1;
        (self.adapt)(hit)
    }

    fn count(&self) -> u64 {
        self.count
    }

    /// The total number of hits, once the first response arrived
    fn size(&self) -> Option<u64> {
        self.total.map(|total| total.value())
    }

    fn close(&mut self) -> Result<()> {
        self.exhausted = true;
        self.hits.clear();
        self.index = 0;
        self.release()
    }
}

impl<C: SearchClient, T> Drop for ScrollIterator<C, T> {
    fn drop(&mut self) {
        if self.scroll_id.is_some()
            && let Err(e) = self.close()
        {
            log::warn!("{:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::is_exhausted;
    use serde::Deserialize;

    /// Serves pages of hits and records every call
    #[derive(Default)]
    struct Pages {
        pages: Vec<Vec<Value>>,
        served: usize,
        scroll_id: Option<&'static str>,
        fail_scroll: bool,
        searches: Vec<SearchRequest>,
        scrolls: Vec<String>,
        cleared: Vec<String>,
    }

    impl Pages {
        fn new(pages: Vec<Vec<Value>>) -> Self {
            Self {
                pages,
                scroll_id: Some("scroll-1"),
                ..Default::default()
            }
        }

        fn total(&self) -> u64 {
            self.pages.iter().map(|p| p.len() as u64).sum()
        }

        fn serve(&mut self) -> SearchResponse {
            let hits = self.pages.get(self.served).cloned().unwrap_or_default();
            self.served += 1;
            SearchResponse::new(self.scroll_id, self.total(), hits)
        }
    }

    impl SearchClient for Pages {
        fn search(&mut self, request: &SearchRequest) -> Result<SearchResponse> {
            self.searches.push(request.clone());
            std::thread::sleep(Duration::from_millis(1));
            Ok(self.serve())
        }

        fn scroll(&mut self, scroll_id: &str, _keep_alive: KeepAlive) -> Result<SearchResponse> {
            self.scrolls.push(scroll_id.to_string());
            if self.fail_scroll {
                return Err(eyre!("connection reset"));
            }
            Ok(self.serve())
        }

        fn clear_scroll(&mut self, scroll_id: &str) -> Result<bool> {
            self.cleared.push(scroll_id.to_string());
            Ok(true)
        }
    }

    fn hit(id: &str) -> Value {
        json!({"_id": id, "_source": {"title": id}})
    }

    #[test]
    fn test_not_prepared() {
        let mut iter = ScrollIterator::new(Pages::new(vec![vec![hit("a")]]));
        let err = iter.has_next().unwrap_err();
        assert_eq!(err.downcast_ref::<IterError>(), Some(&IterError::NotPrepared));
        assert!(iter.client().searches.is_empty());

        iter.prepare_search(["media"]);
        assert!(iter.has_next().unwrap());
    }

    #[test]
    fn test_pages_and_release() {
        let mut iter = ScrollIterator::sources(Pages::new(vec![
            vec![hit("a"), hit("b")],
            vec![hit("c")],
        ]));
        iter.prepare_search(["media"]);
        let titles: Vec<String> = iter
            .elements()
            .map(|s| s.map(|s| s["title"].as_str().unwrap().to_string()))
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(titles, vec!["a", "b", "c"]);
        assert_eq!(iter.count(), 3);
        assert_eq!(iter.size(), Some(3));
        assert_eq!(iter.total_relation(), Some(TotalRelation::Eq));
        assert_eq!(iter.client().scrolls, vec!["scroll-1", "scroll-1"]);
        assert_eq!(iter.client().cleared, vec!["scroll-1"]);
        assert_eq!(iter.scroll_id(), None);

        iter.close().unwrap();
        assert_eq!(iter.client().cleared.len(), 1);
    }

    #[test]
    fn test_zero_hits() {
        let mut iter = ScrollIterator::new(Pages::new(vec![]));
        iter.prepare_search(["empty"]);
        assert!(!iter.has_next().unwrap());
        assert!(!iter.has_next().unwrap());
        assert_eq!(iter.size(), Some(0));
        assert_eq!(iter.client().cleared, vec!["scroll-1"]);
        assert!(iter.client().scrolls.is_empty());
        assert!(is_exhausted(&iter.next().unwrap_err()));
    }

    #[test]
    fn test_default_sort_and_size() {
        let mut iter = ScrollIterator::new(Pages::new(vec![vec![hit("a")]])).batch_size(50);
        iter.prepare_search(["media"]);
        iter.has_next().unwrap();
        let body = &iter.client().searches[0].body;
        assert_eq!(body["sort"], json!(["_doc"]));
        assert_eq!(body["size"], json!(50));

        let mut iter = ScrollIterator::new(Pages::new(vec![vec![hit("a")]])).batch_size(50);
        let body = iter.prepare_search(["media"]);
        body.insert("sort".to_string(), json!([{"date": "desc"}]));
        body.insert("size".to_string(), json!(5));
        iter.has_next().unwrap();
        let body = &iter.client().searches[0].body;
        assert_eq!(body["sort"], json!([{"date": "desc"}]));
        assert_eq!(body["size"], json!(5));
    }

    #[test]
    fn test_missing_scroll_id() {
        let mut pages = Pages::new(vec![vec![hit("a")], vec![hit("b")]]);
        pages.scroll_id = None;
        let mut iter = ScrollIterator::new(pages);
        iter.prepare_search(["media"]);
        assert_eq!(iter.next().unwrap()["_id"], "a");
        assert!(!iter.has_next().unwrap());
        assert!(iter.client().scrolls.is_empty());
        assert!(iter.client().cleared.is_empty());
    }

    #[test]
    fn test_failed_scroll_releases() {
        let mut pages = Pages::new(vec![vec![hit("a")], vec![hit("b")]]);
        pages.fail_scroll = true;
        let mut iter = ScrollIterator::new(pages);
        iter.prepare_search(["media"]);
        assert_eq!(iter.next().unwrap()["_id"], "a");
        let err = iter.has_next().unwrap_err();
        assert!(format!("{:#}", err).contains("connection reset"));
        assert_eq!(iter.client().cleared, vec!["scroll-1"]);
        assert!(!iter.has_next().unwrap());
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Doc {
        title: String,
    }

    #[test]
    fn test_deserialize_failure_continues() {
        let pages = Pages::new(vec![vec![
            hit("a"),
            json!({"_id": "bad", "_source": {"title": 1}}),
            hit("c"),
        ]]);
        let mut iter: ScrollIterator<_, Doc> = ScrollIterator::deserialize(pages);
        iter.prepare_search(["media"]);
        assert_eq!(iter.next().unwrap().title, "a");
        let err = iter.next().unwrap_err();
        assert!(err.to_string().contains("bad"), "{}", err);
        assert_eq!(iter.next().unwrap().title, "c");
        assert_eq!(iter.count(), 3);
    }

    #[test]
    fn test_close_abandoned() {
        let mut iter = ScrollIterator::new(Pages::new(vec![vec![hit("a"), hit("b")]]));
        iter.prepare_search(["media"]);
        iter.next().unwrap();
        iter.close().unwrap();
        iter.close().unwrap();
        assert_eq!(iter.client().cleared, vec!["scroll-1"]);
        assert!(!iter.has_next().unwrap());
    }

    #[test]
    fn test_drop_through_borrowed_client() {
        let mut pages = Pages::new(vec![vec![hit("a"), hit("b")]]);
        {
            let mut iter = ScrollIterator::new(&mut pages);
            iter.prepare_search(["media"]);
            iter.next().unwrap();
        }
        assert_eq!(pages.cleared, vec!["scroll-1"]);
    }

    #[test]
    fn test_client_duration_tracked() {
        let mut iter = ScrollIterator::new(Pages::new(vec![vec![hit("a")]]));
        iter.prepare_search(["media"]);
        assert_eq!(iter.client_duration(), Duration::ZERO);
        assert!(iter.has_next().unwrap());
        let after_search = iter.client_duration();
        assert!(after_search >= Duration::from_millis(1), "{:?}", after_search);

        while iter.has_next().unwrap() {
            iter.next().unwrap();
        }
        assert!(iter.client_duration() >= after_search);
        assert_eq!(iter.client().cleared.len(), 1);
    }
}
