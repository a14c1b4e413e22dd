//! Google Drive v3 implementation of [`RemoteStore`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use super::{FOLDER_MIME, Page, RemoteEntry, RemoteStore, single_folder};
use crate::config::DriveConfig;
use crate::error::RemoteError;

const API_BASE_URL: &str = "https://www.googleapis.com/drive/v3";
const UPLOAD_BASE_URL: &str = "https://www.googleapis.com/upload/drive/v3";
const PAGE_SIZE: u32 = 100;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const LIST_FIELDS: &str = "nextPageToken, files(id, name, mimeType, modifiedTime)";
const MULTIPART_BOUNDARY: &str = "health_sync_upload_boundary";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<RemoteEntry>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreatedFile {
    id: String,
}

/// Drive client authenticated with a bearer access token.
pub struct GoogleDriveStore {
    client: Client,
    access_token: SecretString,
    api_base: String,
    upload_base: String,
}

impl GoogleDriveStore {
    pub fn new(config: &DriveConfig) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| RemoteError::Http(e.to_string()))?;
        Ok(Self {
            client,
            access_token: config.access_token.clone(),
            api_base: API_BASE_URL.to_string(),
            upload_base: UPLOAD_BASE_URL.to_string(),
        })
    }

    /// Point the client at another host (for local emulators).
    pub fn with_base_urls(mut self, api_base: &str, upload_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self.upload_base = upload_base.trim_end_matches('/').to_string();
        self
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.bearer_auth(self.access_token.expose_secret())
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, RemoteError> {
        let response = self
            .authed(builder)
            .send()
            .await
            .map_err(|e| RemoteError::Http(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn query(
        &self,
        q: &str,
        page_size: u32,
        page_token: Option<&str>,
    ) -> Result<FileList, RemoteError> {
        let mut params: Vec<(&str, String)> = vec![
            ("q", q.to_string()),
            ("fields", LIST_FIELDS.to_string()),
            ("pageSize", page_size.to_string()),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }
        let response = self
            .send(self.client.get(format!("{}/files", self.api_base)).query(&params))
            .await?;
        response
            .json::<FileList>()
            .await
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))
    }
}

/// Quote a value for use inside a Drive query string literal.
fn escape_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn multipart_related(metadata: &serde_json::Value, content: &str) -> String {
    format!(
        "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{meta}\r\n\
         --{b}\r\nContent-Type: text/plain; charset=UTF-8\r\n\r\n{content}\r\n--{b}--",
        b = MULTIPART_BOUNDARY,
        meta = metadata,
    )
}

#[async_trait]
impl RemoteStore for GoogleDriveStore {
    async fn list_children(
        &self,
        folder_id: &str,
        page_token: Option<&str>,
    ) -> Result<Page, RemoteError> {
        let q = format!("'{}' in parents and trashed = false", escape_query(folder_id));
        let list = self.query(&q, PAGE_SIZE, page_token).await?;
        debug!(folder = %folder_id, count = list.files.len(), "Listed remote folder page");
        Ok(Page {
            entries: list.files,
            next_page_token: list.next_page_token,
        })
    }

    async fn find_child_folder(
        &self,
        parent_id: &str,
        name: &str,
    ) -> Result<Option<String>, RemoteError> {
        let q = format!(
            "'{}' in parents and name = '{}' and mimeType = '{}' and trashed = false",
            escape_query(parent_id),
            escape_query(name),
            FOLDER_MIME,
        );
        let list = self.query(&q, 2, None).await?;
        single_folder(
            list.files.into_iter().map(|f| f.id).collect(),
            parent_id,
            name,
        )
    }

    async fn download(&self, file_id: &str) -> Result<Vec<u8>, RemoteError> {
        let response = self
            .send(
                self.client
                    .get(format!("{}/files/{}", self.api_base, file_id))
                    .query(&[("alt", "media")]),
            )
            .await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| RemoteError::Http(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn create_folder(&self, parent_id: &str, name: &str) -> Result<String, RemoteError> {
        let body = serde_json::json!({
            "name": name,
            "mimeType": FOLDER_MIME,
            "parents": [parent_id],
        });
        let response = self
            .send(
                self.client
                    .post(format!("{}/files", self.api_base))
                    .query(&[("fields", "id")])
                    .json(&body),
            )
            .await?;
        let created: CreatedFile = response
            .json()
            .await
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;
        debug!(parent = %parent_id, name = %name, id = %created.id, "Created remote folder");
        Ok(created.id)
    }

    async fn upload_text(
        &self,
        folder_id: &str,
        name: &str,
        content: &str,
    ) -> Result<String, RemoteError> {
        let metadata = serde_json::json!({
            "name": name,
            "parents": [folder_id],
            "mimeType": "text/plain",
        });
        let response = self
            .send(
                self.client
                    .post(format!("{}/files", self.upload_base))
                    .query(&[("uploadType", "multipart"), ("fields", "id")])
                    .header(
                        "content-type",
                        format!("multipart/related; boundary={MULTIPART_BOUNDARY}"),
                    )
                    .body(multipart_related(&metadata, content)),
            )
            .await?;
        let created: CreatedFile = response
            .json()
            .await
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;
        Ok(created.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_quotes_in_queries() {
        assert_eq!(escape_query("Dr. O'Neil"), "Dr. O\\'Neil");
        assert_eq!(escape_query(r"a\b"), r"a\\b");
    }

    #[test]
    fn file_list_parses_drive_payload() {
        let raw = r#"{
            "nextPageToken": "tok",
            "files": [
                {"id": "1", "name": "blood.pdf", "mimeType": "application/pdf",
                 "modifiedTime": "2024-05-01T10:00:00.000Z"},
                {"id": "2", "name": "genetic", "mimeType": "application/vnd.google-apps.folder"}
            ]
        }"#;
        let list: FileList = serde_json::from_str(raw).unwrap();
        assert_eq!(list.next_page_token.as_deref(), Some("tok"));
        assert_eq!(list.files.len(), 2);
        assert!(list.files[0].modified_time.is_some());
        assert!(list.files[1].is_folder());
    }

    #[test]
    fn multipart_body_has_both_parts() {
        let meta = serde_json::json!({"name": "a.txt"});
        let body = multipart_related(&meta, "hello");
        assert!(body.contains("\"name\":\"a.txt\""));
        assert!(body.contains("\r\n\r\nhello\r\n"));
        assert!(body.ends_with(&format!("--{MULTIPART_BOUNDARY}--")));
    }

    #[test]
    fn base_urls_can_be_overridden() {
        let config = DriveConfig {
            access_token: SecretString::from("token".to_string()),
            root_path: "me/health".into(),
        };
        let store = GoogleDriveStore::new(&config)
            .unwrap()
            .with_base_urls("http://localhost:9000/", "http://localhost:9000/upload");
        assert_eq!(store.api_base, "http://localhost:9000");
        assert_eq!(store.upload_base, "http://localhost:9000/upload");
    }
}
