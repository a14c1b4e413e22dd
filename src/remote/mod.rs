//! Remote document store: listing, download, upload.
//!
//! The pipeline only depends on the [`RemoteStore`] trait; `gdrive` holds the
//! Google Drive v3 implementation and `walker` the recursive scanner.

pub mod gdrive;
pub mod walker;

pub use gdrive::GoogleDriveStore;
pub use walker::{DEFAULT_MAX_DEPTH, SUBFOLDER_KINDS, TreeWalker};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RemoteError;
use crate::ingest::classify::DocumentKind;

/// MIME type the remote store uses for folders.
pub const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

/// One child entry returned by a listing call (file or folder).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEntry {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    #[serde(default)]
    pub modified_time: Option<DateTime<Utc>>,
}

impl RemoteEntry {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME
    }
}

/// One page of a listing.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub entries: Vec<RemoteEntry>,
    pub next_page_token: Option<String>,
}

/// A file discovered by the walker.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub modified_time: Option<DateTime<Utc>>,
    /// Set only for files found under a known typed subfolder.
    pub subfolder: Option<SubfolderTag>,
}

impl RemoteFile {
    pub(crate) fn from_entry(entry: RemoteEntry, subfolder: Option<SubfolderTag>) -> Self {
        Self {
            id: entry.id,
            name: entry.name,
            mime_type: entry.mime_type,
            modified_time: entry.modified_time,
            subfolder,
        }
    }

    /// The kind implied by the file's location, if any.
    pub fn subfolder_kind(&self) -> Option<DocumentKind> {
        self.subfolder.as_ref().map(|t| t.kind)
    }
}

/// Location-derived classification hint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubfolderTag {
    pub kind: DocumentKind,
    pub name: String,
}

/// Narrow contract over a hierarchical remote file store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// List one page of the non-trashed children of `folder_id`.
    async fn list_children(
        &self,
        folder_id: &str,
        page_token: Option<&str>,
    ) -> Result<Page, RemoteError>;

    /// Find a direct child folder by exact name. More than one match is
    /// [`RemoteError::AmbiguousFolder`].
    async fn find_child_folder(
        &self,
        parent_id: &str,
        name: &str,
    ) -> Result<Option<String>, RemoteError>;

    /// Download a file's bytes.
    async fn download(&self, file_id: &str) -> Result<Vec<u8>, RemoteError>;

    /// Create a child folder and return its id.
    async fn create_folder(&self, parent_id: &str, name: &str) -> Result<String, RemoteError>;

    /// Upload a plain-text file into `folder_id`. Returns the new file id.
    async fn upload_text(
        &self,
        folder_id: &str,
        name: &str,
        content: &str,
    ) -> Result<String, RemoteError>;

    /// Id of the store root.
    fn root_id(&self) -> &str {
        "root"
    }
}

/// Reduce the folders matching `name` under `parent` to at most one id.
pub(crate) fn single_folder(
    mut ids: Vec<String>,
    parent: &str,
    name: &str,
) -> Result<Option<String>, RemoteError> {
    if ids.len() > 1 {
        return Err(RemoteError::AmbiguousFolder {
            segment: name.to_string(),
            parent: parent.to_string(),
        });
    }
    Ok(ids.pop())
}

/// Walk a slash-separated path one segment at a time; every segment must
/// exist exactly once.
pub async fn resolve_folder(store: &dyn RemoteStore, path: &str) -> Result<String, RemoteError> {
    let mut parent = store.root_id().to_string();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        parent = store
            .find_child_folder(&parent, segment)
            .await?
            .ok_or_else(|| RemoteError::FolderNotFound {
                segment: segment.to_string(),
                parent: parent.clone(),
            })?;
    }
    Ok(parent)
}

/// Like [`resolve_folder`], creating missing segments along the way.
pub async fn resolve_or_create_folder(
    store: &dyn RemoteStore,
    path: &str,
) -> Result<String, RemoteError> {
    let mut parent = store.root_id().to_string();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        parent = match store.find_child_folder(&parent, segment).await? {
            Some(id) => id,
            None => store.create_folder(&parent, segment).await?,
        };
    }
    Ok(parent)
}

/// `root/YYYY/MM/DD` folder for dated uploads.
pub fn calendar_folder_path(root: &str, day: NaiveDate) -> String {
    format!("{}/{}", root.trim_end_matches('/'), day.format("%Y/%m/%d"))
}

/// Upload text into the calendar folder for `day`, creating folders as needed.
pub async fn upload_to_calendar(
    store: &dyn RemoteStore,
    root: &str,
    day: NaiveDate,
    name: &str,
    content: &str,
) -> Result<String, RemoteError> {
    let folder = resolve_or_create_folder(store, &calendar_folder_path(root, day)).await?;
    store.upload_text(&folder, name, content).await
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory remote store for tests.

    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;

    #[derive(Debug, Clone)]
    struct Node {
        entry: RemoteEntry,
        parent: String,
        content: Vec<u8>,
    }

    /// Tree-shaped fake with configurable page size and failure injection.
    #[derive(Default)]
    pub struct MemoryStore {
        nodes: Mutex<Vec<Node>>,
        page_size: usize,
        next_id: Mutex<u64>,
        pub fail_listing: Mutex<bool>,
        pub failing_downloads: Mutex<Vec<String>>,
        pub uploads: Mutex<HashMap<String, String>>,
    }

    impl MemoryStore {
        pub fn new(page_size: usize) -> Self {
            Self {
                page_size: page_size.max(1),
                ..Default::default()
            }
        }

        fn alloc_id(&self, prefix: &str) -> String {
            let mut n = self.next_id.lock().unwrap();
            *n += 1;
            format!("{prefix}{n}")
        }

        pub fn add_folder(&self, parent: &str, name: &str) -> String {
            let id = self.alloc_id("dir");
            self.nodes.lock().unwrap().push(Node {
                entry: RemoteEntry {
                    id: id.clone(),
                    name: name.to_string(),
                    mime_type: FOLDER_MIME.to_string(),
                    modified_time: None,
                },
                parent: parent.to_string(),
                content: Vec::new(),
            });
            id
        }

        pub fn add_file(&self, parent: &str, id: &str, name: &str, mime: &str, content: &[u8]) {
            self.nodes.lock().unwrap().push(Node {
                entry: RemoteEntry {
                    id: id.to_string(),
                    name: name.to_string(),
                    mime_type: mime.to_string(),
                    modified_time: None,
                },
                parent: parent.to_string(),
                content: content.to_vec(),
            });
        }
    }

    #[async_trait]
    impl RemoteStore for MemoryStore {
        async fn list_children(
            &self,
            folder_id: &str,
            page_token: Option<&str>,
        ) -> Result<Page, RemoteError> {
            if *self.fail_listing.lock().unwrap() {
                return Err(RemoteError::Http("listing unavailable".into()));
            }
            let children: Vec<RemoteEntry> = self
                .nodes
                .lock()
                .unwrap()
                .iter()
                .filter(|n| n.parent == folder_id)
                .map(|n| n.entry.clone())
                .collect();
            let start: usize = page_token.map(|t| t.parse().unwrap()).unwrap_or(0);
            let end = (start + self.page_size).min(children.len());
            Ok(Page {
                entries: children[start..end].to_vec(),
                next_page_token: (end < children.len()).then(|| end.to_string()),
            })
        }

        async fn find_child_folder(
            &self,
            parent_id: &str,
            name: &str,
        ) -> Result<Option<String>, RemoteError> {
            let ids = self
                .nodes
                .lock()
                .unwrap()
                .iter()
                .filter(|n| n.parent == parent_id && n.entry.name == name && n.entry.is_folder())
                .map(|n| n.entry.id.clone())
                .collect();
            single_folder(ids, parent_id, name)
        }

        async fn download(&self, file_id: &str) -> Result<Vec<u8>, RemoteError> {
            if self
                .failing_downloads
                .lock()
                .unwrap()
                .iter()
                .any(|id| id == file_id)
            {
                return Err(RemoteError::Http(format!("download of {file_id} failed")));
            }
            self.nodes
                .lock()
                .unwrap()
                .iter()
                .find(|n| n.entry.id == file_id)
                .map(|n| n.content.clone())
                .ok_or_else(|| RemoteError::Api {
                    status: 404,
                    body: file_id.to_string(),
                })
        }

        async fn create_folder(&self, parent_id: &str, name: &str) -> Result<String, RemoteError> {
            Ok(self.add_folder(parent_id, name))
        }

        async fn upload_text(
            &self,
            folder_id: &str,
            name: &str,
            content: &str,
        ) -> Result<String, RemoteError> {
            let id = self.alloc_id("up");
            self.add_file(folder_id, &id, name, "text/plain", content.as_bytes());
            self.uploads
                .lock()
                .unwrap()
                .insert(name.to_string(), content.to_string());
            Ok(id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::MemoryStore;
    use super::*;

    #[test]
    fn calendar_path_format() {
        let day = NaiveDate::from_ymd_opt(2026, 2, 10).unwrap();
        assert_eq!(calendar_folder_path("me/health", day), "me/health/2026/02/10");
        assert_eq!(calendar_folder_path("me/health/", day), "me/health/2026/02/10");
    }

    #[tokio::test]
    async fn resolve_walks_segments() {
        let store = MemoryStore::new(10);
        let me = store.add_folder("root", "me");
        let health = store.add_folder(&me, "health");
        assert_eq!(resolve_folder(&store, "me/health").await.unwrap(), health);
    }

    #[tokio::test]
    async fn resolve_missing_segment_is_error() {
        let store = MemoryStore::new(10);
        store.add_folder("root", "me");
        let err = resolve_folder(&store, "me/health").await.unwrap_err();
        assert!(matches!(err, RemoteError::FolderNotFound { ref segment, .. } if segment == "health"));
    }

    #[tokio::test]
    async fn resolve_duplicate_segment_is_error() {
        let store = MemoryStore::new(10);
        let me = store.add_folder("root", "me");
        store.add_folder(&me, "health");
        store.add_folder(&me, "health");
        let err = resolve_folder(&store, "me/health").await.unwrap_err();
        assert!(matches!(
            err,
            RemoteError::AmbiguousFolder { ref segment, ref parent } if segment == "health" && *parent == me
        ));
    }

    #[test]
    fn single_folder_accepts_zero_or_one() {
        assert_eq!(single_folder(Vec::new(), "p", "x").unwrap(), None);
        assert_eq!(
            single_folder(vec!["a".into()], "p", "x").unwrap(),
            Some("a".to_string())
        );
        assert!(single_folder(vec!["a".into(), "b".into()], "p", "x").is_err());
    }

    #[tokio::test]
    async fn resolve_or_create_builds_calendar_folders() {
        let store = MemoryStore::new(10);
        let day = NaiveDate::from_ymd_opt(2026, 2, 10).unwrap();
        upload_to_calendar(&store, "me/health", day, "oura_2026-02-10.txt", "hello")
            .await
            .unwrap();
        assert!(resolve_folder(&store, "me/health/2026/02/10").await.is_ok());
        assert_eq!(
            store.uploads.lock().unwrap().get("oura_2026-02-10.txt").unwrap(),
            "hello"
        );
    }
}
