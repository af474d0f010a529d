//! Google Drive Document Store
//!
//! Implements DocumentStore for Google Drive using the Drive API v3.
//! Create and update are each a single request. Create sends content and
//! metadata together in one `multipart/related` upload, so there is no window
//! where a document exists with metadata but no content. Update replaces the
//! content only, unless title propagation is switched on.

use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use secrecy::ExposeSecret;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

use super::http_retry::{send_with_retry, HttpRetryConfig};
use super::{
    decode_text, require_id, DeleteMode, DocumentId, DocumentStore, ListQuery, RemoteFile,
    StoreError, StoreKind, TokenSource, WriteRequest, TEXT_MIME_TYPE,
};

/// Google Drive API base URL
pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";
pub const UPLOAD_API_BASE: &str = "https://www.googleapis.com/upload/drive/v3";

const LIST_FIELDS: &str = "files(id, name, mimeType, modifiedTime)";

/// Google Drive file list response
#[derive(Debug, Deserialize)]
struct DriveFileList {
    #[serde(default)]
    files: Vec<RemoteFile>,
}

#[derive(Debug, Deserialize)]
struct DriveFileId {
    id: String,
}

/// Google Drive store configuration
#[derive(Debug, Clone)]
pub struct GoogleDriveConfig {
    pub api_base: String,
    pub upload_base: String,
    /// Folder that new documents are created in
    pub parent_folder_id: Option<String>,
    pub request_timeout: Duration,
    pub delete_mode: DeleteMode,
    /// Send the edited title along with content when updating (off by default)
    pub propagate_title: bool,
    pub max_read_retries: u32,
}

impl Default for GoogleDriveConfig {
    fn default() -> Self {
        Self {
            api_base: DRIVE_API_BASE.to_string(),
            upload_base: UPLOAD_API_BASE.to_string(),
            parent_folder_id: None,
            request_timeout: Duration::from_secs(60),
            delete_mode: DeleteMode::Permanent,
            propagate_title: false,
            max_read_retries: 2,
        }
    }
}

impl GoogleDriveConfig {
    /// Point both API roots at one base URL (used against local test servers)
    pub fn with_base_url(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            api_base: format!("{}/drive/v3", base),
            upload_base: format!("{}/upload/drive/v3", base),
            ..Self::default()
        }
    }
}

/// Google Drive document store
pub struct GoogleDriveStore {
    config: GoogleDriveConfig,
    tokens: Arc<dyn TokenSource>,
    client: reqwest::Client,
    retry: HttpRetryConfig,
}

impl GoogleDriveStore {
    pub fn new(config: GoogleDriveConfig, tokens: Arc<dyn TokenSource>) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| StoreError::InvalidConfig(format!("HTTP client: {}", e)))?;
        let retry = HttpRetryConfig::with_max_retries(config.max_read_retries);

        Ok(Self {
            config,
            tokens,
            client,
            retry,
        })
    }

    pub fn config(&self) -> &GoogleDriveConfig {
        &self.config
    }

    /// Get authorization header
    async fn auth_header(&self) -> Result<HeaderValue, StoreError> {
        let token = self.tokens.access_token().await?;
        HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
            .map_err(|e| StoreError::Authentication(format!("Invalid token: {}", e)))
    }

    fn url(&self, base: &str, path: &str) -> Result<Url, StoreError> {
        Url::parse(&format!("{}{}", base, path))
            .map_err(|e| StoreError::InvalidConfig(format!("Invalid API URL: {}", e)))
    }

    fn file_url(&self, base: &str, id: &DocumentId) -> Result<Url, StoreError> {
        self.url(base, &format!("/files/{}", urlencoding::encode(id.as_str())))
    }

    /// Map a non-success response onto the error taxonomy
    async fn check(response: reqwest::Response, context: &str) -> Result<reqwest::Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let text = response.text().await.unwrap_or_default();
        Err(match status.as_u16() {
            401 => StoreError::Authentication(format!("{}: {}", context, text)),
            404 => StoreError::NotFound(context.to_string()),
            code => StoreError::Transport {
                status: Some(code),
                message: text,
            },
        })
    }

    /// Build a `multipart/related` body: JSON metadata part, then text content
    fn multipart_body(metadata: &serde_json::Value, text: &str) -> (String, Vec<u8>) {
        let boundary = format!("drive_notepad_{}", uuid::Uuid::new_v4().simple());
        let mut body = Vec::new();

        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
        body.extend_from_slice(metadata.to_string().as_bytes());
        body.extend_from_slice(b"\r\n");

        body.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
        body.extend_from_slice(format!("Content-Type: {}; charset=UTF-8\r\n\r\n", TEXT_MIME_TYPE).as_bytes());
        body.extend_from_slice(text.as_bytes());
        body.extend_from_slice(format!("\r\n--{}--", boundary).as_bytes());

        (format!("multipart/related; boundary={}", boundary), body)
    }

    async fn create(&self, request: &WriteRequest) -> Result<DocumentId, StoreError> {
        let mut metadata = serde_json::json!({
            "name": request.name,
            "mimeType": TEXT_MIME_TYPE,
        });
        if let Some(parent) = self.config.parent_folder_id.as_deref().filter(|p| !p.is_empty()) {
            metadata["parents"] = serde_json::json!([parent]);
        }
        let (content_type, body) = Self::multipart_body(&metadata, &request.text);

        let mut url = self.url(&self.config.upload_base, "/files")?;
        url.query_pairs_mut()
            .append_pair("uploadType", "multipart")
            .append_pair("fields", "id");

        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, self.auth_header().await?)
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await?;
        let response = Self::check(response, &request.name).await?;

        let created: DriveFileId = response
            .json()
            .await
            .map_err(|e| StoreError::network(format!("Invalid create response: {}", e)))?;

        info!("Created {} ({})", request.name, created.id);
        Ok(DocumentId::new(created.id))
    }

    async fn update(&self, id: &DocumentId, request: &WriteRequest) -> Result<DocumentId, StoreError> {
        require_id(id)?;
        let mut url = self.file_url(&self.config.upload_base, id)?;

        let builder = if self.config.propagate_title {
            let metadata = serde_json::json!({ "name": request.name });
            let (content_type, body) = Self::multipart_body(&metadata, &request.text);
            url.query_pairs_mut()
                .append_pair("uploadType", "multipart")
                .append_pair("fields", "id");
            self.client
                .patch(url)
                .header(CONTENT_TYPE, content_type)
                .body(body)
        } else {
            url.query_pairs_mut()
                .append_pair("uploadType", "media")
                .append_pair("fields", "id");
            self.client
                .patch(url)
                .header(CONTENT_TYPE, format!("{}; charset=UTF-8", TEXT_MIME_TYPE))
                .body(request.text.as_bytes().to_vec())
        };

        let response = builder
            .header(AUTHORIZATION, self.auth_header().await?)
            .send()
            .await?;
        Self::check(response, id.as_str()).await?;

        info!("Updated {}", id);
        Ok(id.clone())
    }
}

#[async_trait]
impl DocumentStore for GoogleDriveStore {
    fn kind(&self) -> StoreKind {
        StoreKind::GoogleDrive
    }

    async fn list_documents(&self, query: &ListQuery) -> Result<Vec<RemoteFile>, StoreError> {
        let mut url = self.url(&self.config.api_base, "/files")?;
        url.query_pairs_mut()
            .append_pair("q", &query.filter())
            .append_pair("pageSize", &query.effective_page_size().to_string())
            .append_pair("fields", LIST_FIELDS)
            .append_pair("orderBy", &query.order_by);

        let request = self
            .client
            .get(url)
            .header(AUTHORIZATION, self.auth_header().await?)
            .build()?;
        let response = send_with_retry(&self.client, request, &self.retry).await?;
        let response = Self::check(response, "file list").await?;

        let list: DriveFileList = response
            .json()
            .await
            .map_err(|e| StoreError::network(format!("Invalid list response: {}", e)))?;

        Ok(list.files)
    }

    async fn read_document(&self, id: &DocumentId) -> Result<String, StoreError> {
        require_id(id)?;
        let mut url = self.file_url(&self.config.api_base, id)?;
        url.query_pairs_mut().append_pair("alt", "media");

        let request = self
            .client
            .get(url)
            .header(AUTHORIZATION, self.auth_header().await?)
            .build()?;
        let response = send_with_retry(&self.client, request, &self.retry).await?;
        let response = Self::check(response, id.as_str()).await?;

        let bytes = response.bytes().await?;
        decode_text(id, bytes.to_vec())
    }

    async fn write_document(&self, request: &WriteRequest) -> Result<DocumentId, StoreError> {
        match &request.id {
            None => self.create(request).await,
            Some(id) => self.update(id, request).await,
        }
    }

    async fn delete_document(&self, id: &DocumentId) -> Result<(), StoreError> {
        require_id(id)?;
        let url = self.file_url(&self.config.api_base, id)?;

        let builder = match self.config.delete_mode {
            DeleteMode::Permanent => self.client.delete(url),
            DeleteMode::Trash => self
                .client
                .patch(url)
                .header(CONTENT_TYPE, "application/json")
                .body(serde_json::json!({ "trashed": true }).to_string()),
        };

        let response = builder
            .header(AUTHORIZATION, self.auth_header().await?)
            .send()
            .await?;

        match Self::check(response, id.as_str()).await {
            Ok(_) => {
                info!("Deleted {}", id);
                Ok(())
            }
            Err(StoreError::NotFound(_)) => {
                warn!("Delete of {} ignored: already gone", id);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::StaticTokenSource;
    use std::io::Read;
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    struct Recorded {
        method: String,
        url: String,
        content_type: Option<String>,
        authorization: Option<String>,
        body: Vec<u8>,
    }

    impl Recorded {
        fn body_text(&self) -> String {
            String::from_utf8_lossy(&self.body).to_string()
        }
    }

    /// Local stand-in for the Drive API. Replies with the scripted
    /// (status, body) pairs in order; the last one repeats.
    struct MockDrive {
        base: String,
        requests: Arc<Mutex<Vec<Recorded>>>,
    }

    impl MockDrive {
        fn start(replies: Vec<(u16, Vec<u8>)>) -> Self {
            Self::start_with_delay(replies, Duration::ZERO)
        }

        fn start_with_delay(replies: Vec<(u16, Vec<u8>)>, delay: Duration) -> Self {
            let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
            let port = server.server_addr().to_ip().unwrap().port();
            let requests = Arc::new(Mutex::new(Vec::new()));
            let log = requests.clone();

            std::thread::spawn(move || {
                let mut index = 0;
                for mut request in server.incoming_requests() {
                    let header = |name: &str| {
                        request
                            .headers()
                            .iter()
                            .find(|h| h.field.as_str().as_str().eq_ignore_ascii_case(name))
                            .map(|h| h.value.as_str().to_string())
                    };
                    let content_type = header("Content-Type");
                    let authorization = header("Authorization");
                    let mut body = Vec::new();
                    let _ = request.as_reader().read_to_end(&mut body);
                    log.lock().unwrap().push(Recorded {
                        method: request.method().to_string(),
                        url: request.url().to_string(),
                        content_type,
                        authorization,
                        body,
                    });

                    let (status, reply) = replies[index.min(replies.len() - 1)].clone();
                    index += 1;
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                    let _ = request.respond(tiny_http::Response::from_data(reply).with_status_code(status));
                }
            });

            Self {
                base: format!("http://127.0.0.1:{}", port),
                requests,
            }
        }

        fn requests(&self) -> Vec<Recorded> {
            self.requests.lock().unwrap().clone()
        }
    }

    fn json(status: u16, body: &str) -> (u16, Vec<u8>) {
        (status, body.as_bytes().to_vec())
    }

    fn store(mock: &MockDrive, tweak: impl FnOnce(&mut GoogleDriveConfig)) -> GoogleDriveStore {
        let mut config = GoogleDriveConfig::with_base_url(&mock.base);
        config.request_timeout = Duration::from_secs(5);
        tweak(&mut config);
        GoogleDriveStore::new(config, Arc::new(StaticTokenSource::new("test-token"))).unwrap()
    }

    fn decoded_query(url: &str) -> Vec<(String, String)> {
        let parsed = Url::parse(&format!("http://localhost{}", url)).unwrap();
        parsed.query_pairs().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[tokio::test]
    async fn test_list_sends_filter_and_parses_files() {
        let mock = MockDrive::start(vec![json(
            200,
            r#"{"files":[{"id":"1","name":"a.txt","mimeType":"text/plain"},{"id":"2","name":"b.txt"}]}"#,
        )]);
        let drive = store(&mock, |_| {});
        let query = ListQuery { parent: Some("folder9".into()), ..ListQuery::default() };

        let files = drive.list_documents(&query).await.unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[1].name, "b.txt");

        let sent = &mock.requests()[0];
        assert_eq!(sent.method, "GET");
        assert!(sent.url.starts_with("/drive/v3/files?"));
        assert_eq!(sent.authorization.as_deref(), Some("Bearer test-token"));
        let params = decoded_query(&sent.url);
        assert!(params.contains(&(
            "q".into(),
            "mimeType = 'text/plain' and trashed = false and 'folder9' in parents".into()
        )));
        assert!(params.contains(&("pageSize".into(), "20".into())));
        assert!(params.contains(&("orderBy".into(), "modifiedTime desc".into())));
    }

    #[tokio::test]
    async fn test_list_without_files_field_is_empty() {
        let mock = MockDrive::start(vec![json(200, "{}")]);
        let files = store(&mock, |_| {}).list_documents(&ListQuery::default()).await.unwrap();
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn test_list_unauthorized_is_authentication_error() {
        let mock = MockDrive::start(vec![json(401, r#"{"error":"invalid_credentials"}"#)]);
        let err = store(&mock, |_| {}).list_documents(&ListQuery::default()).await.unwrap_err();
        assert!(matches!(err, StoreError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_read_returns_text_and_maps_errors() {
        let mock = MockDrive::start(vec![
            json(200, "hello"),
            json(404, "not found"),
            (200, vec![0xff, 0xfe]),
        ]);
        let drive = store(&mock, |_| {});
        let id = DocumentId::new("doc1");

        assert_eq!(drive.read_document(&id).await.unwrap(), "hello");
        assert!(matches!(drive.read_document(&id).await, Err(StoreError::NotFound(_))));
        assert!(matches!(drive.read_document(&id).await, Err(StoreError::Decode(_))));

        let sent = mock.requests();
        assert_eq!(sent[0].url, "/drive/v3/files/doc1?alt=media");
    }

    #[tokio::test]
    async fn test_read_empty_id_makes_no_request() {
        let mock = MockDrive::start(vec![json(200, "x")]);
        let err = store(&mock, |_| {}).read_document(&DocumentId::new("")).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn test_create_is_one_multipart_request() {
        let mock = MockDrive::start(vec![json(200, r#"{"id":"new-1"}"#)]);
        let drive = store(&mock, |c| c.parent_folder_id = Some("folderX".into()));

        let id = drive
            .write_document(&WriteRequest::create("note.txt", "hello"))
            .await
            .unwrap();
        assert_eq!(id.as_str(), "new-1");

        let sent = mock.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].method, "POST");
        assert!(sent[0].url.starts_with("/upload/drive/v3/files?uploadType=multipart"));
        assert!(sent[0]
            .content_type
            .as_deref()
            .unwrap()
            .starts_with("multipart/related; boundary="));
        let body = sent[0].body_text();
        assert!(body.contains(r#""mimeType":"text/plain""#));
        assert!(body.contains(r#""name":"note.txt""#));
        assert!(body.contains(r#""parents":["folderX"]"#));
        assert!(body.contains("\r\n\r\nhello\r\n--"));
    }

    #[tokio::test]
    async fn test_failed_create_is_not_retried() {
        let mock = MockDrive::start(vec![json(503, "backend error")]);
        let err = store(&mock, |_| {})
            .write_document(&WriteRequest::create("n.txt", "t"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Transport { status: Some(503), ref message } if message == "backend error"
        ));
        assert_eq!(mock.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_update_carries_title_and_content() {
        let mock = MockDrive::start(vec![json(200, r#"{"id":"doc1"}"#)]);
        let id = store(&mock, |c| c.propagate_title = true)
            .write_document(&WriteRequest::update(DocumentId::new("doc1"), "renamed.txt", "body"))
            .await
            .unwrap();
        assert_eq!(id.as_str(), "doc1");

        let sent = mock.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].method, "PATCH");
        assert!(sent[0].url.starts_with("/upload/drive/v3/files/doc1?uploadType=multipart"));
        let body = sent[0].body_text();
        assert!(body.contains(r#"{"name":"renamed.txt"}"#));
        assert!(body.contains("body"));
    }

    #[tokio::test]
    async fn test_update_is_content_only_by_default() {
        let mock = MockDrive::start(vec![json(200, r#"{"id":"doc1"}"#)]);
        store(&mock, |_| {})
            .write_document(&WriteRequest::update(DocumentId::new("doc1"), "ignored.txt", "plain"))
            .await
            .unwrap();

        let sent = &mock.requests()[0];
        assert!(sent.url.starts_with("/upload/drive/v3/files/doc1?uploadType=media"));
        assert_eq!(sent.body_text(), "plain");
        assert!(sent.content_type.as_deref().unwrap().starts_with("text/plain"));
    }

    #[tokio::test]
    async fn test_delete_treats_missing_as_success() {
        let mock = MockDrive::start(vec![(204, Vec::new()), json(404, "gone")]);
        let drive = store(&mock, |_| {});
        let id = DocumentId::new("doc1");

        drive.delete_document(&id).await.unwrap();
        drive.delete_document(&id).await.unwrap();

        let sent = mock.requests();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].method, "DELETE");
        assert_eq!(sent[0].url, "/drive/v3/files/doc1");
    }

    #[tokio::test]
    async fn test_delete_in_trash_mode_patches_metadata() {
        let mock = MockDrive::start(vec![json(200, r#"{"id":"doc1"}"#)]);
        store(&mock, |c| c.delete_mode = DeleteMode::Trash)
            .delete_document(&DocumentId::new("doc1"))
            .await
            .unwrap();

        let sent = &mock.requests()[0];
        assert_eq!(sent.method, "PATCH");
        assert_eq!(sent.body_text(), r#"{"trashed":true}"#);
    }

    #[tokio::test]
    async fn test_delete_server_error_is_transport() {
        let mock = MockDrive::start(vec![json(500, "oops")]);
        let err = store(&mock, |_| {})
            .delete_document(&DocumentId::new("doc1"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(500));
    }

    #[tokio::test]
    async fn test_timeout_is_transport_error() {
        let mock = MockDrive::start_with_delay(vec![json(200, r#"{"id":"late"}"#)], Duration::from_millis(800));
        let err = store(&mock, |c| c.request_timeout = Duration::from_millis(100))
            .write_document(&WriteRequest::create("slow.txt", "x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Transport { status: None, .. }));
    }

    #[tokio::test]
    async fn test_ids_are_path_escaped() {
        let mock = MockDrive::start(vec![json(200, "ok")]);
        store(&mock, |_| {})
            .read_document(&DocumentId::new("a/b"))
            .await
            .unwrap();
        assert!(mock.requests()[0].url.starts_with("/drive/v3/files/a%2Fb?"));
    }
}
