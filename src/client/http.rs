//! Search client over the Elasticsearch / OpenSearch REST API
//!
//! Provides [`HttpSearchClient`], a blocking client implementing
//! [`SearchClient`] for the scroll API.

use super::Auth;
use super::search::{KeepAlive, SearchClient, SearchRequest, SearchResponse};
use eyre::{Result, WrapErr, eyre};
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap};
use semver::Version;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use url::Url;

/// What `GET /` reports about the cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterInfo {
    pub name: String,
    pub version: Version,
    /// `elasticsearch` or `opensearch`
    pub distribution: String,
}

impl ClusterInfo {
    /// Clusters before 5.0 expect the bare scroll id as a plain text body
    pub fn plain_scroll_body(&self) -> bool {
        self.distribution == "elasticsearch" && self.version.major < 5
    }
}

#[derive(Deserialize)]
struct RootResponse {
    #[serde(default)]
    cluster_name: String,
    version: RootVersion,
}

#[derive(Deserialize)]
struct RootVersion {
    number: String,
    #[serde(default)]
    distribution: Option<String>,
}

/// Parse version numbers like `8.11.1`, `7.10.2-SNAPSHOT` or `1.7`
pub fn parse_version(number: &str) -> Result<Version> {
    if let Ok(version) = Version::parse(number) {
        return Ok(version);
    }
    let (core, pre) = match number.split_once('-') {
        Some((core, pre)) => (core, Some(pre)),
        None => (number, None),
    };
    let mut parts: Vec<&str> = core.split('.').collect();
    if parts.is_empty() || parts.len() > 3 {
        return Err(eyre!("Invalid version number: {}", number));
    }
    parts.resize(3, "0");
    let padded = match pre {
        Some(pre) => format!("{}-{}", parts.join("."), pre),
        None => parts.join("."),
    };
    Version::parse(&padded).wrap_err_with(|| format!("Invalid version number: {}", number))
}

/// Blocking search client
///
/// # Example
/// ```no_run
/// use pagewalk::client::{Auth, HttpSearchClient};
/// use std::time::Duration;
/// use url::Url;
///
/// # fn example() -> eyre::Result<()> {
/// let url = Url::parse("http://localhost:9200")?;
/// let mut client = HttpSearchClient::try_new(url, Auth::None, Duration::from_secs(30))?;
/// let info = client.cluster_info()?;
/// println!("{} {}", info.name, info.version);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpSearchClient {
    client: Client,
    url: Url,
    info: Option<ClusterInfo>,
}

impl HttpSearchClient {
    /// Create a new client from a base URL, Auth and request timeout
    ///
    /// # Errors
    /// Returns an error if the credentials are not a valid header value or
    /// the HTTP client cannot be built
    pub fn try_new(mut url: Url, auth: Auth, timeout: Duration) -> Result<Self> {
        // joined paths must land under a base path such as a proxy prefix
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        let mut headers = HeaderMap::new();
        if let Some(value) = auth.header_value() {
            headers.insert(AUTHORIZATION, value.parse()?);
        }
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .wrap_err("Failed to build HTTP client")?;
        Ok(Self {
            client,
            url,
            info: None,
        })
    }

    /// Get the base URL.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Fetch the cluster name and version, cached after the first call
    pub fn cluster_info(&mut self) -> Result<&ClusterInfo> {
        if self.info.is_none() {
            let response = self.send(self.client.get(self.url.clone()), "GET /")?;
            let root: RootResponse = response
                .json()
                .wrap_err("Failed to parse cluster information")?;
            let version = parse_version(&root.version.number)?;
            let info = ClusterInfo {
                name: root.cluster_name,
                version,
                distribution: root
                    .version
                    .distribution
                    .unwrap_or_else(|| "elasticsearch".to_string()),
            };
            log::debug!(
                "Connected to {} {} cluster '{}'",
                info.distribution,
                info.version,
                info.name
            );
            self.info = Some(info);
        }
        self.info
            .as_ref()
            .ok_or_else(|| eyre!("Cluster information unavailable"))
    }

    /// URL of the initial scroll search
    pub fn search_url(&self, request: &SearchRequest) -> Result<Url> {
        let mut url = self.url.join(&format!("{}/_search", request.index_path()))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("scroll", &request.keep_alive.to_string());
            if request.version {
                query.append_pair("version", "true");
            }
            if !request.routing.is_empty() {
                query.append_pair("routing", &request.routing.join(","));
            }
        }
        Ok(url)
    }

    pub fn scroll_url(&self) -> Result<Url> {
        Ok(self.url.join("_search/scroll")?)
    }

    /// URL that clears a single scroll context
    pub fn clear_scroll_url(&self, scroll_id: &str) -> Result<Url> {
        let mut url = self.scroll_url()?;
        url.path_segments_mut()
            .map_err(|_| eyre!("Base URL cannot have path segments: {}", self.url))?
            .push(scroll_id);
        Ok(url)
    }

    fn send(&self, builder: RequestBuilder, what: &str) -> Result<Response> {
        let response = builder
            .send()
            .map_err(|e| eyre!("Failed to send {} request: {}", what, e))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().unwrap_or_default();
        Err(eyre!("{} failed with {}: {}", what, status, body))
    }

    fn parse(response: Response) -> Result<SearchResponse> {
        response
            .json()
            .wrap_err("Failed to parse search response")
    }
}

impl SearchClient for HttpSearchClient {
    fn search(&mut self, request: &SearchRequest) -> Result<SearchResponse> {
        let url = self.search_url(request)?;
        log::trace!("POST {}", url);
        let response = self.send(
            self.client.post(url).json(&Value::Object(request.body.clone())),
            "search",
        )?;
        Self::parse(response)
    }

    fn scroll(&mut self, scroll_id: &str, keep_alive: KeepAlive) -> Result<SearchResponse> {
        let plain = self.cluster_info()?.plain_scroll_body();
        let url = self.scroll_url()?;
        let builder = if plain {
            self.client
                .post(url)
                .query(&[("scroll", keep_alive.to_string())])
                .header(CONTENT_TYPE, "text/plain")
                .body(scroll_id.to_string())
        } else {
            self.client.post(url).json(&json!({
                "scroll": keep_alive.to_string(),
                "scroll_id": scroll_id,
            }))
        };
        let response = self.send(builder, "scroll")?;
        Self::parse(response)
    }

    fn clear_scroll(&mut self, scroll_id: &str) -> Result<bool> {
        let url = self.clear_scroll_url(scroll_id)?;
        let response = self
            .client
            .delete(url)
            .send()
            .map_err(|e| eyre!("Failed to send clear scroll request: {}", e))?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => {
                let body = response.text().unwrap_or_default();
                Err(eyre!("clear scroll failed with {}: {}", status, body))
            }
        }
    }
}

impl std::fmt::Display for HttpSearchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.info {
            Some(info) => write!(f, "{} ({} {})", self.url, info.distribution, info.version),
            None => write!(f, "{}", self.url),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> HttpSearchClient {
        let url = Url::parse(base).unwrap();
        HttpSearchClient::try_new(url, Auth::None, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_search_url() {
        let client = client("http://localhost:9200/");
        let mut request = SearchRequest::new(["media", "pages"]);
        request.routing = vec!["r1".to_string(), "r2".to_string()];
        let url = client.search_url(&request).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:9200/media,pages/_search?scroll=1m&version=true&routing=r1%2Cr2"
        );
    }

    #[test]
    fn test_urls_under_path_prefix() {
        let client = client("https://proxy.example.com/es/");
        let mut request = SearchRequest::new(["media"]);
        request.version = false;
        assert_eq!(
            client.search_url(&request).unwrap().as_str(),
            "https://proxy.example.com/es/media/_search?scroll=1m"
        );
        assert_eq!(
            client.clear_scroll_url("abc==").unwrap().as_str(),
            "https://proxy.example.com/es/_search/scroll/abc=="
        );
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("8.11.1").unwrap(), Version::new(8, 11, 1));
        assert_eq!(parse_version("1.7").unwrap(), Version::new(1, 7, 0));
        assert_eq!(parse_version("7.10.2-SNAPSHOT").unwrap().major, 7);
        assert!(parse_version("latest").is_err());
    }

    #[test]
    fn test_plain_scroll_body() {
        let info = |distribution: &str, number: &str| ClusterInfo {
            name: "test".to_string(),
            version: parse_version(number).unwrap(),
            distribution: distribution.to_string(),
        };
        assert!(info("elasticsearch", "2.4.6").plain_scroll_body());
        assert!(!info("elasticsearch", "5.0.0").plain_scroll_body());
        assert!(!info("opensearch", "2.11.0").plain_scroll_body());
    }

    #[test]
    fn test_base_path_without_slash() {
        let client = client("http://localhost:9200/es");
        assert_eq!(
            client.scroll_url().unwrap().as_str(),
            "http://localhost:9200/es/_search/scroll"
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(client("http://localhost:9200").to_string(), "http://localhost:9200/");
    }
}
