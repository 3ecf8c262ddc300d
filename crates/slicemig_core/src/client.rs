use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use log::{debug, warn};
use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::header::{CONTENT_TYPE, RETRY_AFTER, USER_AGENT};
use serde::Deserialize;
use serde_json::Value;

use crate::config::ResolvedSettings;
use crate::document::Document;
use crate::push::MigrationPayload;

pub const MASTER_REF_ID: &str = "master";
pub const API_KEY_HEADER: &str = "x-api-key";
pub const REPOSITORY_HEADER: &str = "repository";

pub trait ContentReadApi {
    /// The ref token of the repository's currently published release.
    fn master_ref(&mut self, repository: &str) -> Result<String>;
    /// All results of a document-id search, across every language.
    fn search_document(
        &mut self,
        repository: &str,
        reference: &str,
        document_id: &str,
    ) -> Result<Vec<Document>>;
    fn request_count(&self) -> usize;
}

pub trait MigrationWriteApi: ContentReadApi {
    /// Checked once before a batch; fails when no write could succeed.
    fn check_write_access(&self) -> Result<()> {
        Ok(())
    }
    /// Transport failures are errors; any HTTP status is a response.
    fn put_document(&mut self, request: &PushRequest<'_>) -> Result<PushResponse>;
}

#[derive(Debug, Clone, Copy)]
pub struct PushRequest<'a> {
    pub repository: &'a str,
    pub token: &'a str,
    pub document_id: &'a str,
    pub payload: &'a MigrationPayload,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushResponse {
    pub status: u16,
    pub body: String,
    pub retry_after: Option<Duration>,
}

impl PushResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Resolves the master ref, then returns the single document with `document_id`.
pub fn fetch_document<A: ContentReadApi + ?Sized>(
    api: &mut A,
    repository: &str,
    document_id: &str,
) -> Result<Document> {
    let reference = api.master_ref(repository)?;
    api.search_document(repository, &reference, document_id)?
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("document {document_id} not found in repository {repository}"))
}

#[derive(Debug, Clone)]
pub struct PrismicClientConfig {
    pub cdn_url: String,
    pub migration_url: String,
    pub api_key: Option<String>,
    pub user_agent: String,
    pub timeout_ms: u64,
}

impl PrismicClientConfig {
    pub fn from_settings(settings: &ResolvedSettings) -> Self {
        Self {
            cdn_url: settings.cdn_url.clone(),
            migration_url: settings.migration_url.clone(),
            api_key: settings.api_key.clone(),
            user_agent: settings.user_agent.clone(),
            timeout_ms: settings.http_timeout_ms,
        }
    }
}

pub struct PrismicClient {
    client: Client,
    config: PrismicClientConfig,
    request_count: usize,
}

impl PrismicClient {
    pub fn new(config: PrismicClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("failed to build Prismic HTTP client")?;
        Ok(Self {
            client,
            config,
            request_count: 0,
        })
    }

    fn api_root(&self, repository: &str) -> String {
        self.config
            .cdn_url
            .replace("{repo}", repository)
            .trim_end_matches('/')
            .to_string()
    }

    fn request_json_get(&mut self, url: &str, query: &[(&str, String)]) -> Result<Value> {
        let url = Url::parse(url).with_context(|| format!("invalid Prismic API URL: {url}"))?;
        self.request_count += 1;
        debug!("GET {url}");

        let response = self
            .client
            .get(url.clone())
            .header(USER_AGENT, self.config.user_agent.clone())
            .query(query)
            .send()
            .with_context(|| format!("failed to call Prismic API {url}"))?;
        let status = response.status();
        if !status.is_success() {
            bail!("Prismic API request to {url} failed with HTTP {status}");
        }
        response
            .json()
            .context("failed to decode Prismic API JSON response")
    }
}

impl ContentReadApi for PrismicClient {
    fn master_ref(&mut self, repository: &str) -> Result<String> {
        let url = self.api_root(repository);
        let payload = self.request_json_get(&url, &[])?;
        let info: ApiInfoResponse =
            serde_json::from_value(payload).context("failed to decode Prismic API refs")?;
        select_master_ref(&info.refs)
            .ok_or_else(|| anyhow!("repository {repository} has no master ref"))
    }

    fn search_document(
        &mut self,
        repository: &str,
        reference: &str,
        document_id: &str,
    ) -> Result<Vec<Document>> {
        let url = format!("{}/documents/search", self.api_root(repository));
        let payload = self.request_json_get(
            &url,
            &[
                ("ref", reference.to_string()),
                ("lang", "*".to_string()),
                ("q", document_id_query(document_id)),
            ],
        )?;
        let parsed: SearchResponse =
            serde_json::from_value(payload).context("failed to decode Prismic search response")?;
        Ok(parsed.results)
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

impl PrismicClient {
    fn migration_api_key(&self) -> Result<&str> {
        self.config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| anyhow!("PRISMIC_MIGRATION_API_KEY is required for push"))
    }
}

impl MigrationWriteApi for PrismicClient {
    fn check_write_access(&self) -> Result<()> {
        self.migration_api_key().map(|_| ())
    }

    fn put_document(&mut self, request: &PushRequest<'_>) -> Result<PushResponse> {
        let api_key = self.migration_api_key()?.to_string();
        let url = format!(
            "{}/documents/{}/",
            self.config.migration_url.trim_end_matches('/'),
            request.document_id
        );
        self.request_count += 1;
        debug!("PUT {url}");

        let response = self
            .client
            .put(&url)
            .bearer_auth(request.token)
            .header(CONTENT_TYPE, "application/json")
            .header(REPOSITORY_HEADER, request.repository)
            .header(API_KEY_HEADER, api_key)
            .header(USER_AGENT, self.config.user_agent.clone())
            .json(request.payload)
            .send()
            .with_context(|| format!("failed to call Prismic migration API {url}"))?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_retry_after);
        let body = match response.text() {
            Ok(body) => body,
            Err(error) => {
                warn!("failed to read migration API response for {url}: {error}");
                format!("failed to read response body: {error}")
            }
        };
        Ok(PushResponse {
            status,
            body,
            retry_after,
        })
    }
}

pub fn document_id_query(document_id: &str) -> String {
    format!("[[at(document.id,\"{document_id}\")]]")
}

fn select_master_ref(refs: &[ApiRef]) -> Option<String> {
    refs.iter()
        .find(|item| item.id == MASTER_REF_ID)
        .or_else(|| refs.iter().find(|item| item.is_master_ref))
        .map(|item| item.reference.clone())
}

/// Only the delta-seconds form of `Retry-After` is honoured.
fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

#[derive(Debug, Deserialize)]
struct ApiInfoResponse {
    #[serde(default)]
    refs: Vec<ApiRef>,
}

#[derive(Debug, Deserialize)]
struct ApiRef {
    id: String,
    #[serde(rename = "ref")]
    reference: String,
    #[serde(rename = "isMasterRef", default)]
    is_master_ref: bool,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Document>,
}
