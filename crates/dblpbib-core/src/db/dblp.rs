use super::{NOT_FOUND_MARKER, RecordFetcher, SearchBackend, SearchHit};
use crate::CoreError;
use crate::rate_limit::{DbQueryError, check_rate_limit_response};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://dblp.org";

/// Prefix stripped from hit URLs to obtain a record id.
const RECORD_URL_PREFIX: &str = "https://dblp.org/rec/";

/// Online DBLP backend: the publication search API and `.bib` record export.
pub struct DblpOnline {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl DblpOnline {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CoreError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("dblpbib/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(client, base_url, timeout))
    }

    /// Use an existing client (shared connection pool, custom TLS, ...).
    pub fn with_client(client: reqwest::Client, base_url: &str, timeout: Duration) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    pub fn search_url(&self, query: &str, hits: usize) -> String {
        format!(
            "{}/search/publ/api?q={}&format=json&h={}",
            self.base_url,
            urlencoding::encode(query),
            hits
        )
    }

    pub fn record_url(&self, record_id: &str) -> String {
        format!("{}/rec/{}.bib", self.base_url, record_id)
    }
}

/// Pull `(title, record id)` pairs out of a search API response.
pub fn parse_search_response(data: &serde_json::Value, hits: usize) -> Vec<SearchHit> {
    data["result"]["hits"]["hit"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .take(hits)
                .map(|hit| {
                    let info = &hit["info"];
                    let title = info["title"].as_str().unwrap_or("No title found");
                    let record_id = info["url"]
                        .as_str()
                        .unwrap_or("")
                        .replace(RECORD_URL_PREFIX, "");
                    SearchHit {
                        title: title.to_string(),
                        record_id,
                    }
                })
                .collect()
        })
        .unwrap_or_default()
}

impl SearchBackend for DblpOnline {
    fn name(&self) -> &str {
        "DBLP"
    }

    fn search<'a>(
        &'a self,
        query: &'a str,
        hits: usize,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<SearchHit>, DbQueryError>> + Send + 'a>> {
        Box::pin(async move {
            let url = self.search_url(query, hits);
            tracing::debug!(%url, "DBLP search");

            let resp = self
                .client
                .get(&url)
                .timeout(self.timeout)
                .send()
                .await
                .map_err(|e| DbQueryError::Other(e.to_string()))?;

            check_rate_limit_response(&resp)?;
            let status = resp.status();
            if !status.is_success() {
                return Err(DbQueryError::Other(format!("HTTP {}", status)));
            }

            let data: serde_json::Value = resp
                .json()
                .await
                .map_err(|e| DbQueryError::Other(e.to_string()))?;

            Ok(parse_search_response(&data, hits))
        })
    }
}

impl RecordFetcher for DblpOnline {
    fn fetch_bib<'a>(
        &'a self,
        record_id: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String, DbQueryError>> + Send + 'a>> {
        Box::pin(async move {
            let url = self.record_url(record_id);
            tracing::debug!(%url, "DBLP record fetch");

            let resp = self
                .client
                .get(&url)
                .timeout(self.timeout)
                .send()
                .await
                .map_err(|e| DbQueryError::Other(e.to_string()))?;

            check_rate_limit_response(&resp)?;
            let status = resp.status();
            let body = resp
                .text()
                .await
                .map_err(|e| DbQueryError::Other(e.to_string()))?;

            // A missing record is a 404 whose body says so; the driver turns
            // that body into the not-found entry.
            if status.is_success()
                || (status == reqwest::StatusCode::NOT_FOUND && body.contains(NOT_FOUND_MARKER))
            {
                Ok(body)
            } else {
                Err(DbQueryError::Other(format!("HTTP {}", status)))
            }
        })
    }
}
