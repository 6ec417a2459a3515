//! HTTP client for Drive v3 compatible tree stores.
//!
//! Listings translate [`ChildQuery`] into the store's `q` expression; uploads
//! use a single `multipart/related` request carrying metadata and content.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, Response};
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;
use uuid::Uuid;

use spritevault_shared::{AppConfig, RemoteItem, Result, SpriteVaultError, access_token};

use crate::{ChildPage, ChildQuery, KindFilter, RemoteTree};

/// MIME type the store uses to mark folders.
const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

/// Fields requested for every file resource.
const FILE_FIELDS: &str = "id,name,parents,modifiedTime,mimeType,trashed";

/// User-Agent string for store requests.
const USER_AGENT: &str = concat!("spritevault/", env!("CARGO_PKG_VERSION"));

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    parents: Vec<String>,
    #[serde(default)]
    modified_time: Option<DateTime<Utc>>,
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    trashed: bool,
}

impl From<DriveFile> for RemoteItem {
    fn from(file: DriveFile) -> Self {
        Self {
            is_folder: file.mime_type == FOLDER_MIME,
            id: file.id,
            name: file.name,
            parents: file.parents,
            modified_at: file.modified_time.unwrap_or_default(),
            trashed: file.trashed,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedFile {
    id: String,
}

// ---------------------------------------------------------------------------
// DriveClient
// ---------------------------------------------------------------------------

/// Bearer-token authenticated client for a Drive v3 style API.
pub struct DriveClient {
    client: Client,
    base: Url,
    token: String,
    page_size: u32,
}

impl DriveClient {
    /// Create a client against `base_url` (e.g. `https://www.googleapis.com`).
    pub fn new(base_url: &str, token: impl Into<String>, page_size: u32) -> Result<Self> {
        let mut normalized = base_url.to_string();
        if !normalized.ends_with('/') {
            normalized.push('/');
        }
        let base = Url::parse(&normalized).map_err(|e| {
            SpriteVaultError::config(format!("invalid store base_url '{base_url}': {e}"))
        })?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| {
                SpriteVaultError::StoreUnavailable(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            base,
            token: token.into(),
            page_size: page_size.max(1),
        })
    }

    /// Create a client from the `[store]` config section and its token env var.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let token = access_token(config)?;
        Self::new(&config.store.base_url, token, config.store.page_size)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| SpriteVaultError::config(format!("invalid endpoint '{path}': {e}")))
    }

    fn files_url(&self, item_id: Option<&str>) -> Result<Url> {
        match item_id {
            Some(id) => self.endpoint(&format!("drive/v3/files/{id}")),
            None => self.endpoint("drive/v3/files"),
        }
    }
}

/// Build the `q` expression for a folder listing.
fn build_query(folder_id: &str, query: &ChildQuery) -> String {
    let mut q = format!("'{}' in parents and trashed = false", escape(folder_id));
    if let Some(name) = &query.name {
        q.push_str(&format!(" and name = '{}'", escape(name)));
    }
    match query.kind {
        KindFilter::Any => {}
        KindFilter::Files => q.push_str(&format!(" and mimeType != '{FOLDER_MIME}'")),
        KindFilter::Folders => q.push_str(&format!(" and mimeType = '{FOLDER_MIME}'")),
    }
    q
}

/// Escape a literal for use inside a single-quoted query string.
fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Map a non-success status to a store error.
fn check(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(SpriteVaultError::StoreUnavailable(format!(
            "{what}: HTTP {status}"
        )))
    }
}

fn network(what: &str) -> impl Fn(reqwest::Error) -> SpriteVaultError + '_ {
    move |e| SpriteVaultError::StoreUnavailable(format!("{what}: {e}"))
}

/// Assemble a `multipart/related` upload body.
fn multipart_body(boundary: &str, metadata: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(bytes.len() + metadata.len() + 256);
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(
        format!("--{boundary}\r\nContent-Type: application/octet-stream\r\n\r\n").as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

impl RemoteTree for DriveClient {
    #[instrument(skip_all, fields(folder_id = %folder_id, paged = page_token.is_some()))]
    async fn list_children(
        &self,
        folder_id: &str,
        query: &ChildQuery,
        page_token: Option<&str>,
    ) -> Result<ChildPage> {
        let what = format!("list {folder_id}");
        let q = build_query(folder_id, query);
        let fields = format!("nextPageToken,files({FILE_FIELDS})");
        let page_size = self.page_size.to_string();

        let mut params: Vec<(&str, &str)> = vec![
            ("q", q.as_str()),
            ("fields", fields.as_str()),
            ("pageSize", page_size.as_str()),
            ("spaces", "drive"),
            ("includeItemsFromAllDrives", "true"),
            ("supportsAllDrives", "true"),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }

        let response = self
            .client
            .get(self.files_url(None)?)
            .bearer_auth(&self.token)
            .query(&params)
            .send()
            .await
            .map_err(network(&what))?;

        let list: FileList = check(response, &what)?
            .json()
            .await
            .map_err(network(&what))?;

        debug!(folder_id, returned = list.files.len(), "listed folder page");
        Ok(ChildPage {
            items: list.files.into_iter().map(RemoteItem::from).collect(),
            next_page_token: list.next_page_token.filter(|t| !t.is_empty()),
        })
    }

    async fn get_item(&self, item_id: &str) -> Result<RemoteItem> {
        let what = format!("get {item_id}");
        let response = self
            .client
            .get(self.files_url(Some(item_id))?)
            .bearer_auth(&self.token)
            .query(&[("fields", FILE_FIELDS), ("supportsAllDrives", "true")])
            .send()
            .await
            .map_err(network(&what))?;

        let file: DriveFile = check(response, &what)?
            .json()
            .await
            .map_err(network(&what))?;
        Ok(file.into())
    }

    async fn move_item(&self, item_id: &str, from_parent: &str, to_parent: &str) -> Result<()> {
        let what = format!("move {item_id}");
        let response = self
            .client
            .patch(self.files_url(Some(item_id))?)
            .bearer_auth(&self.token)
            .query(&[
                ("addParents", to_parent),
                ("removeParents", from_parent),
                ("fields", "id,parents"),
                ("supportsAllDrives", "true"),
            ])
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(network(&what))?;

        check(response, &what)?;
        Ok(())
    }

    async fn create_item(&self, parent_id: &str, name: &str, bytes: &[u8]) -> Result<String> {
        let what = format!("upload {name}");
        let metadata = serde_json::json!({ "name": name, "parents": [parent_id] }).to_string();
        let boundary = format!("spritevault-{}", Uuid::now_v7().simple());
        let body = multipart_body(&boundary, &metadata, bytes);

        let response = self
            .client
            .post(self.endpoint("upload/drive/v3/files")?)
            .bearer_auth(&self.token)
            .query(&[
                ("uploadType", "multipart"),
                ("fields", "id"),
                ("supportsAllDrives", "true"),
            ])
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={boundary}"),
            )
            .body(body)
            .send()
            .await
            .map_err(network(&what))?;

        let created: CreatedFile = check(response, &what)?
            .json()
            .await
            .map_err(network(&what))?;
        Ok(created.id)
    }

    async fn read_item(&self, item_id: &str) -> Result<Vec<u8>> {
        let what = format!("read {item_id}");
        let response = self
            .client
            .get(self.files_url(Some(item_id))?)
            .bearer_auth(&self.token)
            .query(&[("alt", "media"), ("supportsAllDrives", "true")])
            .send()
            .await
            .map_err(network(&what))?;

        let bytes = check(response, &what)?
            .bytes()
            .await
            .map_err(network(&what))?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{
        body_string_contains, header, method, path, query_param, query_param_is_missing,
    };
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> DriveClient {
        DriveClient::new(&server.uri(), "test-token", 2).unwrap()
    }

    #[test]
    fn query_building() {
        assert_eq!(
            build_query("root", &ChildQuery::files(Some("it's.png"))),
            "'root' in parents and trashed = false and name = 'it\\'s.png' \
             and mimeType != 'application/vnd.google-apps.folder'"
        );
        assert_eq!(
            build_query("root", &ChildQuery::folders()),
            "'root' in parents and trashed = false \
             and mimeType = 'application/vnd.google-apps.folder'"
        );
        assert_eq!(
            build_query("root", &ChildQuery::default()),
            "'root' in parents and trashed = false"
        );
    }

    #[test]
    fn multipart_layout() {
        let body = multipart_body("b", r#"{"name":"a.png"}"#, b"PNG");
        let text = String::from_utf8(body).unwrap();
        assert!(text.starts_with("--b\r\nContent-Type: application/json"));
        assert!(text.contains("{\"name\":\"a.png\"}\r\n--b\r\n"));
        assert!(text.ends_with("PNG\r\n--b--\r\n"));
    }

    #[tokio::test]
    async fn list_follows_page_tokens() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .and(header("authorization", "Bearer test-token"))
            .and(query_param_is_missing("pageToken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "nextPageToken": "tok-2",
                "files": [
                    {"id": "f1", "name": "a.png", "parents": ["root"],
                     "modifiedTime": "2024-12-01T10:00:00.000Z", "mimeType": "image/png"},
                    {"id": "d1", "name": "tools", "parents": ["root"],
                     "modifiedTime": "2024-12-01T10:00:00.000Z", "mimeType": FOLDER_MIME}
                ]
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .and(query_param("pageToken", "tok-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "files": [
                    {"id": "f2", "name": "b.png", "parents": ["root"],
                     "modifiedTime": "2024-12-02T10:00:00.000Z", "mimeType": "image/png"}
                ]
            })))
            .mount(&server)
            .await;

        let drive = client(&server);
        let query = ChildQuery::default();
        let first = drive.list_children("root", &query, None).await.unwrap();
        assert_eq!(first.items.len(), 2);
        assert!(first.items[1].is_folder);
        assert_eq!(first.next_page_token.as_deref(), Some("tok-2"));

        let second = drive
            .list_children("root", &query, Some("tok-2"))
            .await
            .unwrap();
        assert_eq!(second.items[0].id, "f2");
        assert!(second.next_page_token.is_none());
    }

    #[tokio::test]
    async fn move_sends_parent_swap() {
        let server = MockServer::start().await;

        Mock::given(method("PATCH"))
            .and(path("/drive/v3/files/f1"))
            .and(query_param("addParents", "archive"))
            .and(query_param("removeParents", "root"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"id": "f1", "parents": ["archive"]})),
            )
            .expect(1)
            .mount(&server)
            .await;

        client(&server)
            .move_item("f1", "root", "archive")
            .await
            .expect("move succeeds");
    }

    #[tokio::test]
    async fn create_uploads_multipart() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/upload/drive/v3/files"))
            .and(query_param("uploadType", "multipart"))
            .and(body_string_contains("\"name\":\"sword.png\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "new-1"})))
            .mount(&server)
            .await;

        let id = client(&server)
            .create_item("root", "sword.png", b"pixels")
            .await
            .unwrap();
        assert_eq!(id, "new-1");
    }

    #[tokio::test]
    async fn read_returns_media_bytes() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/drive/v3/files/f1"))
            .and(query_param("alt", "media"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"\x89PNG".to_vec()))
            .mount(&server)
            .await;

        let bytes = client(&server).read_item("f1").await.unwrap();
        assert_eq!(bytes, b"\x89PNG");
    }

    #[tokio::test]
    async fn get_item_detects_folder() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/drive/v3/files/archive"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "archive", "name": "Archive", "mimeType": FOLDER_MIME
            })))
            .mount(&server)
            .await;

        let item = client(&server).get_item("archive").await.unwrap();
        assert!(item.is_folder);
        assert_eq!(item.name, "Archive");
    }

    #[tokio::test]
    async fn http_errors_are_store_unavailable() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/drive/v3/files"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client(&server)
            .list_children("root", &ChildQuery::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, SpriteVaultError::StoreUnavailable(ref m) if m.contains("503")));
    }
}
