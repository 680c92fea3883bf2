//! Search cluster client and authentication.
//!
//! This module provides the [`SearchClient`] trait the scroll iterator runs
//! against, the [`HttpSearchClient`] implementation of it, and the
//! authentication types ([`Auth`], [`AuthType`]).

mod auth;
mod http;
mod search;

pub use auth::{Auth, AuthType};
pub use http::{ClusterInfo, HttpSearchClient, parse_version};
pub use search::{
    Hits, KeepAlive, SearchClient, SearchRequest, SearchResponse, TotalHits, TotalRelation,
    format_duration, parse_duration,
};
