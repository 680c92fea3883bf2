//! Search cluster protocol types
//!
//! [`SearchClient`] is the seam between [`crate::scroll::ScrollIterator`] and
//! the cluster: anything that can run a search, continue a scroll and clear
//! one can be iterated.

use eyre::{Result, WrapErr, bail, eyre};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

const DURATION_PATTERN: &str = r"^\s*(\d+)\s*(ms|s|m|h)\s*$";

/// How long the cluster keeps a scroll context between two requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAlive(Duration);

impl KeepAlive {
    pub fn new(duration: Duration) -> Self {
        Self(duration)
    }

    pub fn duration(&self) -> Duration {
        self.0
    }
}

impl Default for KeepAlive {
    fn default() -> Self {
        Self(Duration::from_secs(60))
    }
}

/// Formats in the largest unit that divides the duration, e.g. `1m`, `90s`
impl fmt::Display for KeepAlive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_duration(self.0))
    }
}

impl FromStr for KeepAlive {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        parse_duration(s).map(Self)
    }
}

/// Parse durations in the cluster's time unit syntax: `500ms`, `30s`, `1m`, `2h`
pub fn parse_duration(s: &str) -> Result<Duration> {
    let regex = Regex::new(DURATION_PATTERN).wrap_err("Invalid duration pattern")?;
    let Some(captures) = regex.captures(s) else {
        bail!("Invalid duration '{}', expected e.g. 500ms, 30s, 1m or 2h", s);
    };
    let amount: u64 = captures[1]
        .parse()
        .map_err(|e| eyre!("Invalid duration '{}': {}", s, e))?;
    let seconds = match &captures[2] {
        "ms" => return Ok(Duration::from_millis(amount)),
        "s" => Some(amount),
        "m" => amount.checked_mul(60),
        _ => amount.checked_mul(3600),
    };
    seconds
        .map(Duration::from_secs)
        .ok_or_else(|| eyre!("Duration '{}' too large", s))
}

/// Inverse of [`parse_duration`], using the largest unit that divides `duration`
pub fn format_duration(duration: Duration) -> String {
    match duration.as_millis() {
        0 => "0s".to_string(),
        m if m % 3_600_000 == 0 => format!("{}h", m / 3_600_000),
        m if m % 60_000 == 0 => format!("{}m", m / 60_000),
        m if m % 1_000 == 0 => format!("{}s", m / 1_000),
        m => format!("{}ms", m),
    }
}

impl Serialize for KeepAlive {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for KeepAlive {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// An initial scroll search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub indices: Vec<String>,
    pub body: Map<String, Value>,
    pub keep_alive: KeepAlive,
    pub routing: Vec<String>,
    /// Request document versions with every hit
    pub version: bool,
}

impl SearchRequest {
    pub fn new<S: Into<String>>(indices: impl IntoIterator<Item = S>) -> Self {
        Self {
            indices: indices.into_iter().map(Into::into).collect(),
            body: Map::new(),
            keep_alive: KeepAlive::default(),
            routing: Vec::new(),
            version: true,
        }
    }

    /// Comma separated indices, `_all` when none are given
    pub fn index_path(&self) -> String {
        if self.indices.is_empty() {
            "_all".to_string()
        } else {
            self.indices.join(",")
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TotalRelation {
    /// The total is exact
    #[default]
    Eq,
    /// The total is a lower bound
    Gte,
}

/// `hits.total`: a plain number before Elasticsearch 7, an object after
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TotalHits {
    Count(u64),
    Described {
        value: u64,
        #[serde(default)]
        relation: TotalRelation,
    },
}

impl TotalHits {
    pub fn value(&self) -> u64 {
        match self {
            Self::Count(value) | Self::Described { value, .. } => *value,
        }
    }

    pub fn relation(&self) -> TotalRelation {
        match self {
            Self::Count(_) => TotalRelation::Eq,
            Self::Described { relation, .. } => *relation,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Hits {
    #[serde(default)]
    pub total: Option<TotalHits>,
    #[serde(default)]
    pub hits: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(rename = "_scroll_id", default)]
    pub scroll_id: Option<String>,
    #[serde(default)]
    pub took: Option<u64>,
    #[serde(default)]
    pub hits: Hits,
}

impl SearchResponse {
    pub fn new(scroll_id: Option<&str>, total: u64, hits: Vec<Value>) -> Self {
        Self {
            scroll_id: scroll_id.map(str::to_string),
            took: None,
            hits: Hits {
                total: Some(TotalHits::Count(total)),
                hits,
            },
        }
    }
}

/// A cluster that supports scrolling searches
pub trait SearchClient {
    /// Run the initial search, opening a scroll context
    fn search(&mut self, request: &SearchRequest) -> Result<SearchResponse>;

    /// Fetch the next page of an open scroll context
    fn scroll(&mut self, scroll_id: &str, keep_alive: KeepAlive) -> Result<SearchResponse>;

    /// Release a scroll context, returning whether the cluster knew it
    fn clear_scroll(&mut self, scroll_id: &str) -> Result<bool>;
}

impl<C: SearchClient + ?Sized> SearchClient for &mut C {
    fn search(&mut self, request: &SearchRequest) -> Result<SearchResponse> {
        (**self).search(request)
    }

    fn scroll(&mut self, scroll_id: &str, keep_alive: KeepAlive) -> Result<SearchResponse> {
        (**self).scroll(scroll_id, keep_alive)
    }

    fn clear_scroll(&mut self, scroll_id: &str) -> Result<bool> {
        (**self).clear_scroll(scroll_id)
    }
}

impl<C: SearchClient + ?Sized> SearchClient for Box<C> {
    fn search(&mut self, request: &SearchRequest) -> Result<SearchResponse> {
        (**self).search(request)
    }

    fn scroll(&mut self, scroll_id: &str, keep_alive: KeepAlive) -> Result<SearchResponse> {
        (**self).scroll(scroll_id, keep_alive)
    }

    fn clear_scroll(&mut self, scroll_id: &str) -> Result<bool> {
        (**self).clear_scroll(scroll_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keep_alive_parse() {
        assert_eq!("1m".parse::<KeepAlive>().unwrap().duration(), Duration::from_secs(60));
        assert_eq!(" 30s ".parse::<KeepAlive>().unwrap().duration(), Duration::from_secs(30));
        assert_eq!("250ms".parse::<KeepAlive>().unwrap().duration(), Duration::from_millis(250));
        assert_eq!("2h".parse::<KeepAlive>().unwrap().duration(), Duration::from_secs(7200));
        assert!("1 minute".parse::<KeepAlive>().is_err());
        assert!("-1m".parse::<KeepAlive>().is_err());

        let err = parse_duration("307445734561825861m").unwrap_err();
        assert!(err.to_string().contains("too large"), "{}", err);
        assert!(parse_duration("5124095576030432h").is_err());
        assert_eq!(
            parse_duration("307445734561825860m").unwrap(),
            Duration::from_secs(307445734561825860 * 60)
        );
    }

    #[test]
    fn test_keep_alive_display() {
        assert_eq!(KeepAlive::default().to_string(), "1m");
        assert_eq!(KeepAlive::new(Duration::from_secs(90)).to_string(), "90s");
        assert_eq!(KeepAlive::new(Duration::from_secs(7200)).to_string(), "2h");
        assert_eq!(KeepAlive::new(Duration::from_millis(1500)).to_string(), "1500ms");
    }

    #[test]
    fn test_total_hits_forms() {
        let old: SearchResponse =
            serde_json::from_value(json!({"_scroll_id": "s1", "hits": {"total": 12, "hits": []}}))
                .unwrap();
        assert_eq!(old.scroll_id.as_deref(), Some("s1"));
        assert_eq!(old.hits.total.unwrap().value(), 12);
        assert_eq!(old.hits.total.unwrap().relation(), TotalRelation::Eq);

        let new: SearchResponse = serde_json::from_value(json!({
            "hits": {"total": {"value": 10000, "relation": "gte"}, "hits": [{"_id": "a"}]}
        }))
        .unwrap();
        assert_eq!(new.scroll_id, None);
        assert_eq!(new.hits.total.unwrap().value(), 10000);
        assert_eq!(new.hits.total.unwrap().relation(), TotalRelation::Gte);
        assert_eq!(new.hits.hits.len(), 1);
    }

    #[test]
    fn test_index_path() {
        assert_eq!(SearchRequest::new(["media", "pages"]).index_path(), "media,pages");
        assert_eq!(SearchRequest::new(Vec::<String>::new()).index_path(), "_all");
    }
}
