use std::thread::sleep;
use std::time::Duration;

use anyhow::{Result, bail};
use log::{info, warn};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::client::{MigrationWriteApi, PushRequest};
use crate::document::Document;

/// Body of a migration API document update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationPayload {
    pub uid: Option<String>,
    pub data: Map<String, Value>,
    pub title: String,
    pub tags: Vec<String>,
}

impl MigrationPayload {
    pub fn from_document(document: &Document) -> Self {
        Self {
            uid: document.uid.clone(),
            data: document.data.clone(),
            title: document.title().to_string(),
            tags: document.tags.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PushOptions {
    pub repository: String,
    pub token: String,
    pub delay: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct PushPageResult {
    pub document_id: String,
    pub action: String,
    pub status: Option<u16>,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PushReport {
    pub success: bool,
    pub pushed: usize,
    pub failed: usize,
    pub errors: Vec<String>,
    pub pages: Vec<PushPageResult>,
    pub request_count: usize,
}

pub fn push_documents<A: MigrationWriteApi + ?Sized>(
    api: &mut A,
    documents: &[Document],
    options: &PushOptions,
) -> Result<PushReport> {
    push_documents_with_pacer(api, documents, options, |delay| {
        if !delay.is_zero() {
            sleep(delay);
        }
    })
}

/// Pushes every document in order. A failed document is recorded and the
/// batch moves on; `pace` runs after each request whatever its outcome.
pub fn push_documents_with_pacer<A, P>(
    api: &mut A,
    documents: &[Document],
    options: &PushOptions,
    mut pace: P,
) -> Result<PushReport>
where
    A: MigrationWriteApi + ?Sized,
    P: FnMut(Duration),
{
    if options.token.trim().is_empty() {
        bail!("push requires a non-empty access token");
    }
    if options.repository.trim().is_empty() {
        bail!("push requires a repository");
    }
    api.check_write_access()?;
    let requests_before = api.request_count();

    let mut report = PushReport {
        success: true,
        pushed: 0,
        failed: 0,
        errors: Vec::new(),
        pages: Vec::new(),
        request_count: 0,
    };

    for document in documents {
        let payload = MigrationPayload::from_document(document);
        let request = PushRequest {
            repository: &options.repository,
            token: options.token.trim(),
            document_id: &document.id,
            payload: &payload,
        };

        let retry_after = match api.put_document(&request) {
            Ok(response) if response.is_success() => {
                info!("pushed document {}", document.id);
                report.pushed += 1;
                report.pages.push(PushPageResult {
                    document_id: document.id.clone(),
                    action: "pushed".to_string(),
                    status: Some(response.status),
                    detail: None,
                });
                response.retry_after
            }
            Ok(response) => {
                warn!(
                    "push of document {} failed with HTTP {}",
                    document.id, response.status
                );
                report.failed += 1;
                report.errors.push(format!(
                    "{}: HTTP {}: {}",
                    document.id,
                    response.status,
                    response.body.trim()
                ));
                report.pages.push(PushPageResult {
                    document_id: document.id.clone(),
                    action: "error".to_string(),
                    status: Some(response.status),
                    detail: Some(response.body.trim().to_string()),
                });
                response.retry_after
            }
            Err(error) => {
                warn!("push of document {} failed: {error:#}", document.id);
                report.failed += 1;
                report.errors.push(format!("{}: {error:#}", document.id));
                report.pages.push(PushPageResult {
                    document_id: document.id.clone(),
                    action: "error".to_string(),
                    status: None,
                    detail: Some(format!("{error:#}")),
                });
                None
            }
        };

        pace(pacing_delay(options.delay, retry_after));
    }

    report.request_count = api.request_count().saturating_sub(requests_before);
    report.success = report.errors.is_empty();
    Ok(report)
}

/// The configured delay, stretched when the server asked for a longer pause.
pub fn pacing_delay(base: Duration, retry_after: Option<Duration>) -> Duration {
    match retry_after {
        Some(requested) if requested > base => requested,
        _ => base,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use anyhow::anyhow;
    use serde_json::json;

    use super::*;
    use crate::client::{ContentReadApi, PushResponse};

    #[derive(Default)]
    struct MockWriter {
        responses: BTreeMap<String, PushResponse>,
        transport_failures: Vec<String>,
        pushed: Vec<(String, String, Value)>,
        request_count: usize,
        missing_api_key: bool,
    }

    impl ContentReadApi for MockWriter {
        fn master_ref(&mut self, _repository: &str) -> Result<String> {
            Ok("master".to_string())
        }

        fn search_document(
            &mut self,
            _repository: &str,
            _reference: &str,
            _document_id: &str,
        ) -> Result<Vec<Document>> {
            Ok(Vec::new())
        }

        fn request_count(&self) -> usize {
            self.request_count
        }
    }

    impl MigrationWriteApi for MockWriter {
        fn check_write_access(&self) -> Result<()> {
            if self.missing_api_key {
                bail!("PRISMIC_MIGRATION_API_KEY is required for push");
            }
            Ok(())
        }

        fn put_document(&mut self, request: &PushRequest<'_>) -> Result<PushResponse> {
            self.request_count += 1;
            self.pushed.push((
                request.document_id.to_string(),
                request.token.to_string(),
                serde_json::to_value(request.payload).expect("payload"),
            ));
            if self.transport_failures.iter().any(|id| id == request.document_id) {
                return Err(anyhow!("connection reset"));
            }
            Ok(self
                .responses
                .get(request.document_id)
                .cloned()
                .unwrap_or(PushResponse {
                    status: 200,
                    body: "{}".to_string(),
                    retry_after: None,
                }))
        }
    }

    fn document(id: &str) -> Document {
        serde_json::from_value(json!({
            "id": id,
            "uid": format!("{id}-uid"),
            "lang": "fr-fr",
            "slugs": [format!("{id}-slug"), "older-slug"],
            "tags": ["migrated"],
            "data": { "body": [] }
        }))
        .expect("document")
    }

    fn options(delay_ms: u64) -> PushOptions {
        PushOptions {
            repository: "acme".to_string(),
            token: "token-1".to_string(),
            delay: Duration::from_millis(delay_ms),
        }
    }

    #[test]
    fn payload_uses_first_slug_as_title() {
        let payload = MigrationPayload::from_document(&document("X"));
        assert_eq!(
            serde_json::to_value(&payload).expect("encode"),
            json!({
                "uid": "X-uid",
                "data": { "body": [] },
                "title": "X-slug",
                "tags": ["migrated"],
            })
        );

        let mut untitled = document("Y");
        untitled.slugs.clear();
        assert_eq!(MigrationPayload::from_document(&untitled).title, "");
    }

    #[test]
    fn failed_document_does_not_stop_the_batch() {
        let mut api = MockWriter::default();
        api.responses.insert(
            "X".to_string(),
            PushResponse {
                status: 500,
                body: "{\"message\":\"internal error\"}\n".to_string(),
                retry_after: None,
            },
        );
        let mut waits = Vec::new();

        let report = push_documents_with_pacer(
            &mut api,
            &[document("X"), document("Y")],
            &options(1_500),
            |delay| waits.push(delay),
        )
        .expect("push");

        assert!(!report.success);
        assert_eq!(report.pushed, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.pages[0].document_id, "X");
        assert_eq!(report.pages[0].action, "error");
        assert_eq!(report.pages[0].status, Some(500));
        assert_eq!(
            report.pages[0].detail.as_deref(),
            Some("{\"message\":\"internal error\"}")
        );
        assert_eq!(report.pages[1].document_id, "Y");
        assert_eq!(report.pages[1].action, "pushed");
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("X: HTTP 500"));
        assert_eq!(report.request_count, 2);
        assert_eq!(waits, vec![Duration::from_millis(1_500); 2]);
        assert_eq!(api.pushed[1].1, "token-1");
    }

    #[test]
    fn transport_errors_are_recorded_per_document() {
        let mut api = MockWriter {
            transport_failures: vec!["X".to_string()],
            ..MockWriter::default()
        };
        let mut waits = 0;
        let report = push_documents_with_pacer(
            &mut api,
            &[document("X"), document("Y")],
            &options(0),
            |_| waits += 1,
        )
        .expect("push");
        assert_eq!(report.failed, 1);
        assert_eq!(report.pushed, 1);
        assert_eq!(report.pages[0].status, None);
        assert!(report.errors[0].contains("connection reset"));
        assert_eq!(waits, 2);
    }

    #[test]
    fn retry_after_stretches_the_next_wait() {
        let mut api = MockWriter::default();
        api.responses.insert(
            "X".to_string(),
            PushResponse {
                status: 429,
                body: "slow down".to_string(),
                retry_after: Some(Duration::from_secs(5)),
            },
        );
        let mut waits = Vec::new();
        push_documents_with_pacer(
            &mut api,
            &[document("X"), document("Y")],
            &options(2_000),
            |delay| waits.push(delay),
        )
        .expect("push");
        assert_eq!(
            waits,
            vec![Duration::from_secs(5), Duration::from_millis(2_000)]
        );
    }

    #[test]
    fn pacing_delay_keeps_base_when_server_asks_less() {
        let base = Duration::from_secs(2);
        assert_eq!(pacing_delay(base, None), base);
        assert_eq!(pacing_delay(base, Some(Duration::from_secs(1))), base);
        assert_eq!(
            pacing_delay(base, Some(Duration::from_secs(3))),
            Duration::from_secs(3)
        );
    }

    #[test]
    fn push_requires_token() {
        let mut api = MockWriter::default();
        let mut options = options(0);
        options.token = "  ".to_string();
        let error = push_documents(&mut api, &[document("X")], &options).expect_err("must fail");
        assert!(error.to_string().contains("non-empty access token"));
        assert!(api.pushed.is_empty());
    }

    #[test]
    fn missing_api_key_stops_before_any_request() {
        let mut api = MockWriter {
            missing_api_key: true,
            ..MockWriter::default()
        };
        let mut waits = Vec::new();
        let error = push_documents_with_pacer(
            &mut api,
            &[document("X"), document("Y")],
            &options(2_000),
            |delay| waits.push(delay),
        )
        .expect_err("must fail");
        assert!(error.to_string().contains("PRISMIC_MIGRATION_API_KEY"));
        assert!(api.pushed.is_empty());
        assert!(waits.is_empty());
    }

    #[test]
    fn request_count_covers_only_this_batch() {
        let mut api = MockWriter {
            request_count: 2,
            ..MockWriter::default()
        };
        let report = push_documents_with_pacer(
            &mut api,
            &[document("X"), document("Y")],
            &options(0),
            |_| {},
        )
        .expect("push");
        assert_eq!(report.request_count, 2);
        assert_eq!(api.request_count, 4);
    }

    #[test]
    fn empty_batch_is_successful() {
        let mut api = MockWriter::default();
        let report = push_documents(&mut api, &[], &options(0)).expect("push");
        assert!(report.success);
        assert_eq!(report.pushed, 0);
        assert!(report.pages.is_empty());
    }
}
