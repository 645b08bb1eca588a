use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::error::CurateError;

pub const EUTILS_BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

/// Parameters of one `esearch.fcgi` call. Results are always requested as XML.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchQuery {
    pub db: String,
    pub term: String,
    pub mindate: Option<String>,
    pub maxdate: Option<String>,
    pub retmax: Option<u32>,
}

impl SearchQuery {
    pub fn new(db: &str, term: impl Into<String>) -> Self {
        Self {
            db: db.to_string(),
            term: term.into(),
            ..Self::default()
        }
    }

    fn params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("db", self.db.clone()),
            ("term", self.term.clone()),
            ("retmode", "xml".to_string()),
        ];
        if let Some(mindate) = &self.mindate {
            params.push(("mindate", mindate.clone()));
        }
        if let Some(maxdate) = &self.maxdate {
            params.push(("maxdate", maxdate.clone()));
        }
        if let Some(retmax) = self.retmax {
            params.push(("retmax", retmax.to_string()));
        }
        params
    }
}

/// E-utilities transport. Implementations return the raw XML body; parsing
/// lives with the callers.
pub trait NcbiClient: Send + Sync {
    fn esearch(&self, query: &SearchQuery) -> Result<String, CurateError>;
    fn efetch(&self, db: &str, ids: &[String]) -> Result<String, CurateError>;
    fn esummary(&self, db: &str, id: &str) -> Result<String, CurateError>;
}

#[derive(Clone)]
pub struct NcbiHttpClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl NcbiHttpClient {
    pub fn new(timeout: Duration) -> Result<Self, CurateError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("litcurate/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| CurateError::NcbiHttp(err.to_string()))?,
        );

        let api_key = std::env::var("NCBI_API_KEY")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| CurateError::NcbiHttp(err.to_string()))?;

        Ok(Self {
            client,
            base_url: EUTILS_BASE_URL.to_string(),
            api_key,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn with_api_key(&self, mut params: Vec<(&'static str, String)>) -> Vec<(&'static str, String)> {
        if let Some(api_key) = &self.api_key {
            params.push(("api_key", api_key.clone()));
        }
        params
    }

    fn read_body(
        &self,
        response: reqwest::blocking::Response,
        utility: &str,
    ) -> Result<String, CurateError> {
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "NCBI request failed".to_string());
            return Err(CurateError::NcbiStatus { status, message });
        }
        let body = response
            .text()
            .map_err(|err| CurateError::NcbiHttp(err.to_string()))?;
        if body.trim().is_empty() {
            return Err(CurateError::EmptyResponse(utility.to_string()));
        }
        Ok(body)
    }

    fn send_with_retries<F>(
        &self,
        mut make_req: F,
    ) -> Result<reqwest::blocking::Response, CurateError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        tracing::debug!(status, attempt, "retrying E-utilities request");
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(CurateError::NcbiHttp(err.to_string()));
                }
            }
        }
    }
}

impl NcbiClient for NcbiHttpClient {
    fn esearch(&self, query: &SearchQuery) -> Result<String, CurateError> {
        let url = format!("{}/esearch.fcgi", self.base_url);
        let params = self.with_api_key(query.params());
        tracing::debug!(db = %query.db, term = %query.term, "esearch");
        let response = self.send_with_retries(|| self.client.get(&url).query(&params))?;
        self.read_body(response, "esearch")
    }

    fn efetch(&self, db: &str, ids: &[String]) -> Result<String, CurateError> {
        let url = format!("{}/efetch.fcgi", self.base_url);
        // POST keeps long id lists out of the URL.
        let form = self.with_api_key(vec![
            ("db", db.to_string()),
            ("id", ids.join(",")),
            ("retmode", "xml".to_string()),
        ]);
        tracing::debug!(db, ids = ids.len(), "efetch");
        let response = self.send_with_retries(|| self.client.post(&url).form(&form))?;
        self.read_body(response, "efetch")
    }

    fn esummary(&self, db: &str, id: &str) -> Result<String, CurateError> {
        let url = format!("{}/esummary.fcgi", self.base_url);
        let params = self.with_api_key(vec![
            ("db", db.to_string()),
            ("id", id.to_string()),
            ("retmode", "xml".to_string()),
        ]);
        tracing::debug!(db, id, "esummary");
        let response = self.send_with_retries(|| self.client.get(&url).query(&params))?;
        self.read_body(response, "esummary")
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
