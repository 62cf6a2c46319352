//! PubMed literature source over NCBI E-utilities.
//!
//! One query is two requests: `esearch` for the total count and the top
//! ids, then `esummary` for titles, journals and dates of those ids. A
//! zero count skips the second request. Each request takes its own rate
//! limit slot.
//!
//! ## Security
//!
//! The optional NCBI API key is held in an [`ApiCredential`] and only
//! exposed when it is added to the query string.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
#[cfg(feature = "pubmed")]
use std::time::Duration;
use vigil_core::{LiteratureResult, Paper};

use crate::config::{API_KEY_ENV, CONTACT_EMAIL_ENV};

use super::{
    factory::SourceFactory,
    secrets::ApiCredential,
    LiteratureQuery, LiteratureSource, QueryError, RequestPacer,
};

const DEFAULT_BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
const DEFAULT_TOOL: &str = "vigil";

lazy_static! {
    /// A plausible publication year inside a free-form pubdate
    static ref PUB_YEAR: Regex = Regex::new(r"\b(1[89]\d{2}|20\d{2})\b").unwrap();
}

pub struct PubmedSource {
    base_url: String,
    tool: String,
    contact_email: Option<String>,
    credential: Option<ApiCredential>,
    #[cfg(feature = "pubmed")]
    client: reqwest::Client,
}

impl std::fmt::Debug for PubmedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PubmedSource")
            .field("base_url", &self.base_url)
            .field("tool", &self.tool)
            .field("contact_email", &self.contact_email)
            .field("credential", &self.credential)
            .finish()
    }
}

impl PubmedSource {
    /// Source against the public NCBI endpoint with no API key.
    pub fn new() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            tool: DEFAULT_TOOL.to_string(),
            contact_email: None,
            credential: None,
            #[cfg(feature = "pubmed")]
            client: reqwest::Client::new(),
        }
    }

    /// Create from JSON configuration with environment fallback.
    ///
    /// Recognized keys: `base_url`, `tool`, `contact_email`, `api_key`.
    pub fn from_config(config: &JsonValue) -> Result<Self, QueryError> {
        let mut source = Self::new();

        if let Some(url) = config["base_url"].as_str() {
            source.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(tool) = config["tool"].as_str() {
            source.tool = tool.to_string();
        }
        source.contact_email = config["contact_email"]
            .as_str()
            .map(str::to_string)
            .or_else(|| std::env::var(CONTACT_EMAIL_ENV).ok())
            .filter(|e| !e.is_empty());
        source.credential = ApiCredential::optional_from_config_or_env(
            config,
            "api_key",
            API_KEY_ENV,
            "NCBI API key",
        );

        Ok(source)
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_contact_email(mut self, email: impl Into<String>) -> Self {
        self.contact_email = Some(email.into());
        self
    }

    pub fn with_credential(mut self, credential: ApiCredential) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Identity and key parameters NCBI expects on every request.
    #[cfg_attr(not(feature = "pubmed"), allow(dead_code))]
    fn common_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("tool", self.tool.clone())];
        if let Some(email) = &self.contact_email {
            params.push(("email", email.clone()));
        }
        if let Some(cred) = &self.credential {
            // Only expose the credential here, at the point of use
            params.push(("api_key", cred.expose().to_string()));
        }
        params
    }

    #[cfg(feature = "pubmed")]
    async fn get(&self, endpoint: &str, params: &[(&str, String)]) -> Result<String, QueryError> {
        let response = self
            .client
            .get(format!("{}/{}", self.base_url, endpoint))
            .query(&self.common_params())
            .query(params)
            .send()
            .await
            .map_err(|e| QueryError::HttpError(e.to_string()))?;

        let status = response.status();

        if status == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(QueryError::RateLimited { retry_after });
        }

        let body = response
            .text()
            .await
            .map_err(|e| QueryError::HttpError(e.to_string()))?;

        if !status.is_success() {
            return Err(QueryError::ApiError {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            });
        }

        Ok(body)
    }
}

impl Default for PubmedSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Search term for a query: the symptom as a title/abstract phrase, ANDed
/// with an OR group of context terms when there are any.
#[cfg_attr(not(feature = "pubmed"), allow(dead_code))]
pub(crate) fn build_term(query: &LiteratureQuery) -> String {
    let mut term = format!("\"{}\"[Title/Abstract]", query.term);
    if !query.context_terms.is_empty() {
        let context = query
            .context_terms
            .iter()
            .map(|t| format!("\"{}\"", t))
            .collect::<Vec<_>>()
            .join(" OR ");
        term.push_str(&format!(" AND ({})", context));
    }
    term
}

#[derive(Debug, Deserialize)]
struct EsearchResponse {
    esearchresult: EsearchResult,
}

#[derive(Debug, Deserialize)]
struct EsearchResult {
    #[serde(default)]
    count: Option<String>,
    #[serde(default)]
    idlist: Vec<String>,
    #[serde(rename = "ERROR", default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EsummaryResponse {
    result: serde_json::Map<String, JsonValue>,
}

#[derive(Debug, Deserialize)]
struct SummaryDoc {
    #[serde(default)]
    title: String,
    #[serde(default)]
    fulljournalname: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    pubdate: String,
}

/// Total count and ids from an esearch body.
#[cfg_attr(not(feature = "pubmed"), allow(dead_code))]
pub(crate) fn parse_esearch(body: &str) -> Result<(u64, Vec<String>), QueryError> {
    let response: EsearchResponse =
        serde_json::from_str(body).map_err(|e| QueryError::ParseError(e.to_string()))?;
    let result = response.esearchresult;

    if let Some(error) = result.error {
        return Err(QueryError::MalformedQuery(error));
    }

    let count = result
        .count
        .ok_or_else(|| QueryError::ParseError("esearch result has no count".to_string()))?
        .parse::<u64>()
        .map_err(|e| QueryError::ParseError(format!("esearch count: {}", e)))?;

    Ok((count, result.idlist))
}

/// Papers for `ids` from an esummary body, in id order.
///
/// Ids missing from the summary are skipped.
#[cfg_attr(not(feature = "pubmed"), allow(dead_code))]
pub(crate) fn parse_esummary(body: &str, ids: &[String]) -> Result<Vec<Paper>, QueryError> {
    let response: EsummaryResponse =
        serde_json::from_str(body).map_err(|e| QueryError::ParseError(e.to_string()))?;

    let mut papers = Vec::with_capacity(ids.len());
    for id in ids {
        let Some(doc) = response.result.get(id) else {
            continue;
        };
        let doc: SummaryDoc = serde_json::from_value(doc.clone())
            .map_err(|e| QueryError::ParseError(format!("summary for {}: {}", id, e)))?;

        let journal = if doc.fulljournalname.is_empty() {
            doc.source
        } else {
            doc.fulljournalname
        };
        papers.push(Paper {
            title: doc.title,
            year: parse_year(&doc.pubdate),
            journal,
        });
    }
    Ok(papers)
}

/// Year from a pubdate such as `"2023 Jan 15"` or `"Winter 2019"`.
#[cfg_attr(not(feature = "pubmed"), allow(dead_code))]
pub(crate) fn parse_year(pubdate: &str) -> Option<i32> {
    PUB_YEAR
        .captures(pubdate)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

#[async_trait]
impl LiteratureSource for PubmedSource {
    #[cfg(feature = "pubmed")]
    async fn search(
        &self,
        query: &LiteratureQuery,
        pacer: &RequestPacer<'_>,
    ) -> Result<LiteratureResult, QueryError> {
        let term = build_term(query);
        tracing::debug!(symptom = %query.symptom, term = %term, "PubMed esearch");

        let search_params = [
            ("db", "pubmed".to_string()),
            ("retmode", "json".to_string()),
            ("sort", "relevance".to_string()),
            ("retmax", query.max_papers.to_string()),
            ("term", term),
        ];
        let body = pacer.send(self.get("esearch.fcgi", &search_params)).await?;
        let (count, ids) = parse_esearch(&body)?;

        if count == 0 || ids.is_empty() {
            return Ok(LiteratureResult::new(count, Vec::new()));
        }

        let summary_params = [
            ("db", "pubmed".to_string()),
            ("retmode", "json".to_string()),
            ("id", ids.join(",")),
        ];
        let body = pacer.send(self.get("esummary.fcgi", &summary_params)).await?;
        let papers = parse_esummary(&body, &ids)?;

        Ok(LiteratureResult::new(count, papers).truncated(query.max_papers))
    }

    #[cfg(not(feature = "pubmed"))]
    async fn search(
        &self,
        _query: &LiteratureQuery,
        _pacer: &RequestPacer<'_>,
    ) -> Result<LiteratureResult, QueryError> {
        Err(QueryError::NotConfigured(
            "PubMed source requires 'pubmed' feature".to_string(),
        ))
    }

    async fn health_check(&self) -> bool {
        cfg!(feature = "pubmed")
    }

    fn name(&self) -> &str {
        "pubmed"
    }
}

/// Factory for [`PubmedSource`].
///
/// ## Configuration Format
/// ```json
/// {
///   "base_url": "https://...",       // Optional, E-utilities endpoint
///   "tool": "vigil",                 // Optional, reported to NCBI
///   "contact_email": "me@lab.org",   // Optional, falls back to VIGIL_CONTACT_EMAIL
///   "api_key": "..."                 // Optional, falls back to NCBI_API_KEY
/// }
/// ```
pub struct PubmedSourceFactory;

impl SourceFactory for PubmedSourceFactory {
    fn source_type(&self) -> &'static str {
        "pubmed"
    }

    fn create(&self, config: &JsonValue) -> Result<Arc<dyn LiteratureSource>, QueryError> {
        self.validate_config(config)?;
        let source = PubmedSource::from_config(config)?;
        if source.contact_email.is_none() {
            tracing::warn!(
                "No contact email configured for PubMed; set {} to identify this client",
                CONTACT_EMAIL_ENV
            );
        }
        Ok(Arc::new(source))
    }

    fn validate_config(&self, config: &JsonValue) -> Result<(), QueryError> {
        if let Some(url) = config["base_url"].as_str() {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(QueryError::NotConfigured(
                    "base_url must start with http:// or https://".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn default_config(&self) -> JsonValue {
        serde_json::json!({
            "base_url": DEFAULT_BASE_URL,
            "tool": DEFAULT_TOOL
        })
    }

    fn description(&self) -> &'static str {
        "PubMed via NCBI E-utilities"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::literature::QueryOptions;

    #[test]
    fn test_build_term_plain() {
        let query = LiteratureQuery::new("Sulfur Burps", &QueryOptions::default()).unwrap();
        assert_eq!(build_term(&query), "\"sulfur burps\"[Title/Abstract]");
    }

    #[test]
    fn test_build_term_with_context() {
        let options = QueryOptions {
            context_terms: vec!["semaglutide".into(), "tirzepatide".into()],
            max_papers: 5,
        };
        let query = LiteratureQuery::new("nausea", &options).unwrap();
        assert_eq!(
            build_term(&query),
            "\"nausea\"[Title/Abstract] AND (\"semaglutide\" OR \"tirzepatide\")"
        );
    }

    #[test]
    fn test_parse_esearch() {
        let body = r#"{"header": {}, "esearchresult": {"count": "42", "retmax": "2", "idlist": ["111", "222"]}}"#;
        let (count, ids) = parse_esearch(body).unwrap();
        assert_eq!(count, 42);
        assert_eq!(ids, vec!["111", "222"]);
    }

    #[test]
    fn test_parse_esearch_error_is_permanent() {
        let body = r#"{"esearchresult": {"ERROR": "Invalid query"}}"#;
        let err = parse_esearch(body).unwrap_err();
        assert!(matches!(err, QueryError::MalformedQuery(_)));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_parse_garbage_is_transient() {
        let err = parse_esearch("<html>busy</html>").unwrap_err();
        assert!(matches!(err, QueryError::ParseError(_)));
        assert!(err.is_transient());
    }

    #[test]
    fn test_parse_esummary_keeps_id_order() {
        let body = r#"{"result": {
            "uids": ["222", "111"],
            "111": {"uid": "111", "title": "First", "fulljournalname": "Obesity", "pubdate": "2023 Jan 15"},
            "222": {"uid": "222", "title": "Second", "source": "Diabetes Care", "pubdate": "Winter 2019"}
        }}"#;
        let ids = vec!["111".to_string(), "222".to_string(), "333".to_string()];
        let papers = parse_esummary(body, &ids).unwrap();

        assert_eq!(papers.len(), 2);
        assert_eq!(papers[0].title, "First");
        assert_eq!(papers[0].year, Some(2023));
        assert_eq!(papers[1].journal, "Diabetes Care");
        assert_eq!(papers[1].year, Some(2019));
    }

    #[test]
    fn test_parse_year_missing() {
        assert_eq!(parse_year(""), None);
        assert_eq!(parse_year("Spring"), None);
    }

    #[test]
    fn test_from_config_reads_credential_without_exposing() {
        let config = serde_json::json!({
            "api_key": "ncbi-secret",
            "contact_email": "lab@example.org",
            "base_url": "http://localhost:9999/"
        });
        let source = PubmedSource::from_config(&config).unwrap();

        assert_eq!(source.base_url, "http://localhost:9999");
        assert!(!format!("{:?}", source).contains("ncbi-secret"));
        let params = source.common_params();
        assert!(params.contains(&("email", "lab@example.org".to_string())));
        assert!(params.contains(&("api_key", "ncbi-secret".to_string())));
    }

    #[test]
    fn test_factory_rejects_bad_url() {
        let config = serde_json::json!({ "base_url": "ftp://example.org" });
        assert!(PubmedSourceFactory.validate_config(&config).is_err());
    }

    #[cfg(not(feature = "pubmed"))]
    #[tokio::test]
    async fn test_search_without_feature_is_not_configured() {
        let query = LiteratureQuery::new("nausea", &QueryOptions::default()).unwrap();
        let limiter = crate::resilience::RateLimiter::new(
            std::time::Duration::ZERO,
            Arc::new(crate::clock::ManualClock::new()),
        );
        let pacer = RequestPacer::new(&limiter, std::time::Duration::from_secs(30));
        let err = PubmedSource::new().search(&query, &pacer).await.unwrap_err();
        assert!(matches!(err, QueryError::NotConfigured(_)));
        assert!(!err.is_transient());
    }

    #[cfg(feature = "pubmed")]
    mod http {
        use super::*;
        use crate::cache::CacheConfig;
        use crate::client::LiteratureClient;
        use crate::clock::ManualClock;
        use crate::resilience::RateLimitConfig;
        use parking_lot::Mutex;
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        use tokio::net::TcpListener;

        const ESEARCH: &str = r#"{"esearchresult": {"count": "2", "idlist": ["111", "222"]}}"#;
        const ESUMMARY: &str = r#"{"result": {
            "uids": ["111", "222"],
            "111": {"title": "First", "fulljournalname": "Obesity", "pubdate": "2023"},
            "222": {"title": "Second", "source": "Diabetes Care", "pubdate": "2021 Mar"}
        }}"#;

        /// Answers E-utilities requests with canned bodies and records the
        /// endpoint of each request in arrival order.
        async fn serve(listener: TcpListener, endpoints: Arc<Mutex<Vec<String>>>) {
            while let Ok((mut socket, _)) = listener.accept().await {
                let endpoints = endpoints.clone();
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 16 * 1024];
                    let n = socket.read(&mut buf).await.unwrap_or(0);
                    let request = String::from_utf8_lossy(&buf[..n]).to_string();
                    let path = request.split_whitespace().nth(1).unwrap_or("").to_string();

                    let body = if path.contains("esearch.fcgi") {
                        endpoints.lock().push("esearch".to_string());
                        ESEARCH
                    } else {
                        endpoints.lock().push("esummary".to_string());
                        ESUMMARY
                    };
                    let response = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        }

        #[tokio::test]
        async fn test_every_http_request_takes_a_rate_limit_slot() {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let endpoints = Arc::new(Mutex::new(Vec::new()));
            tokio::spawn(serve(listener, endpoints.clone()));

            let clock = Arc::new(ManualClock::new());
            let source = PubmedSource::new().with_base_url(format!("http://{}", addr));
            let client = LiteratureClient::builder(Arc::new(source))
                .rate_limit(RateLimitConfig {
                    requests_per_minute: 60,
                })
                .cache(CacheConfig {
                    enabled: false,
                    ..Default::default()
                })
                .clock(clock.clone())
                .build();

            let first = client.query("nausea").await.unwrap();
            client.query("fatigue").await.unwrap();

            assert_eq!(first.paper_count, 2);
            assert_eq!(first.papers[1].journal, "Diabetes Care");
            assert_eq!(
                *endpoints.lock(),
                vec!["esearch", "esummary", "esearch", "esummary"]
            );

            // Four requests at 60 rpm: every request after the first waits
            // out a full second
            assert_eq!(clock.sleeps(), vec![std::time::Duration::from_secs(1); 3]);
            let stats = client.stats();
            assert_eq!(stats.attempts, 2);
            assert_eq!(stats.requests, 4);
        }
    }
}
