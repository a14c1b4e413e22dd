//! Recursive remote tree walker.

use tracing::{debug, info};

use super::{RemoteEntry, RemoteFile, RemoteStore, SubfolderTag, resolve_folder};
use crate::error::RemoteError;
use crate::ingest::classify::DocumentKind;

/// Default maximum folder depth below a typed subfolder (the subfolder is 0).
pub const DEFAULT_MAX_DEPTH: usize = 5;

/// Known typed subfolders, in scan order.
pub const SUBFOLDER_KINDS: &[(&str, DocumentKind)] = &[
    ("genetic", DocumentKind::GeneticReport),
    ("genetics", DocumentKind::GeneticReport),
    ("blood", DocumentKind::BloodPanel),
    ("urine", DocumentKind::UrineAnalysis),
    ("sperm", DocumentKind::SemenAnalysis),
    ("prescription", DocumentKind::Prescription),
    ("prescriptions", DocumentKind::Prescription),
    ("conclusion", DocumentKind::ClinicalConclusion),
    ("conclusions", DocumentKind::ClinicalConclusion),
    ("health_check", DocumentKind::WellnessCheckup),
    ("health_checks", DocumentKind::WellnessCheckup),
    ("checkup", DocumentKind::WellnessCheckup),
    ("check-up", DocumentKind::WellnessCheckup),
    ("scans", DocumentKind::MedicalImage),
];

/// Lists files under a root folder and its typed subfolders.
#[derive(Debug, Clone)]
pub struct TreeWalker {
    subfolders: Vec<(String, DocumentKind)>,
    max_depth: usize,
}

impl Default for TreeWalker {
    fn default() -> Self {
        Self::new(
            SUBFOLDER_KINDS
                .iter()
                .map(|(name, kind)| (name.to_string(), *kind))
                .collect(),
            DEFAULT_MAX_DEPTH,
        )
    }
}

impl TreeWalker {
    pub fn new(subfolders: Vec<(String, DocumentKind)>, max_depth: usize) -> Self {
        Self {
            subfolders,
            max_depth,
        }
    }

    /// Resolve `root_path` and walk it.
    pub async fn walk(
        &self,
        store: &dyn RemoteStore,
        root_path: &str,
    ) -> Result<Vec<RemoteFile>, RemoteError> {
        let root_id = resolve_folder(store, root_path).await?;
        self.walk_folder(store, &root_id).await
    }

    /// Walk an already-resolved root folder.
    ///
    /// Direct non-folder children come first, untagged. Each configured
    /// subfolder present under the root is then descended in table order and
    /// its files are tagged. Any listing error aborts the walk.
    pub async fn walk_folder(
        &self,
        store: &dyn RemoteStore,
        root_id: &str,
    ) -> Result<Vec<RemoteFile>, RemoteError> {
        let mut files: Vec<RemoteFile> = list_all(store, root_id)
            .await?
            .into_iter()
            .filter(|e| !e.is_folder())
            .map(|e| RemoteFile::from_entry(e, None))
            .collect();
        let root_count = files.len();

        for (name, kind) in &self.subfolders {
            let Some(sub_id) = store.find_child_folder(root_id, name).await? else {
                continue;
            };
            let tag = SubfolderTag {
                kind: *kind,
                name: name.clone(),
            };
            let before = files.len();
            self.collect_deep(store, sub_id, &tag, &mut files).await?;
            debug!(
                subfolder = %name,
                kind = %kind,
                count = files.len() - before,
                "Scanned typed subfolder"
            );
        }

        info!(
            root = root_count,
            total = files.len(),
            "Remote tree walk complete"
        );
        Ok(files)
    }

    /// Depth-first collection below one typed subfolder.
    async fn collect_deep(
        &self,
        store: &dyn RemoteStore,
        start_id: String,
        tag: &SubfolderTag,
        out: &mut Vec<RemoteFile>,
    ) -> Result<(), RemoteError> {
        let mut stack: Vec<(String, usize)> = vec![(start_id, 0)];
        while let Some((folder_id, depth)) = stack.pop() {
            if depth > self.max_depth {
                continue;
            }
            let mut child_folders = Vec::new();
            for entry in list_all(store, &folder_id).await? {
                if entry.is_folder() {
                    child_folders.push(entry.id);
                } else {
                    out.push(RemoteFile::from_entry(entry, Some(tag.clone())));
                }
            }
            // Reverse so children are visited in listing order.
            for child in child_folders.into_iter().rev() {
                stack.push((child, depth + 1));
            }
        }
        Ok(())
    }
}

/// Exhaust pagination for one folder.
async fn list_all(store: &dyn RemoteStore, folder_id: &str) -> Result<Vec<RemoteEntry>, RemoteError> {
    let mut entries = Vec::new();
    let mut token: Option<String> = None;
    loop {
        let page = store.list_children(folder_id, token.as_deref()).await?;
        entries.extend(page.entries);
        match page.next_page_token {
            Some(next) if !next.is_empty() => token = Some(next),
            _ => break,
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::testing::MemoryStore;

    const PDF: &str = "application/pdf";

    fn health_root(store: &MemoryStore) -> String {
        let me = store.add_folder("root", "me");
        store.add_folder(&me, "health")
    }

    #[tokio::test]
    async fn root_files_are_untagged_and_untyped_folders_ignored() {
        let store = MemoryStore::new(100);
        let root = health_root(&store);
        store.add_file(&root, "f1", "labs.pdf", PDF, b"");
        let misc = store.add_folder(&root, "misc");
        store.add_file(&misc, "f2", "other.pdf", PDF, b"");

        let files = TreeWalker::default().walk(&store, "me/health").await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].id, "f1");
        assert!(files[0].subfolder.is_none());
    }

    #[tokio::test]
    async fn typed_subfolder_files_are_tagged() {
        let store = MemoryStore::new(100);
        let root = health_root(&store);
        let genetic = store.add_folder(&root, "genetic");
        let year = store.add_folder(&genetic, "2024");
        store.add_file(&year, "g1", "results.pdf", PDF, b"");

        let files = TreeWalker::default().walk(&store, "me/health").await.unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].subfolder_kind(), Some(DocumentKind::GeneticReport));
        assert_eq!(files[0].subfolder.as_ref().unwrap().name, "genetic");
    }

    #[tokio::test]
    async fn duplicated_typed_subfolder_aborts_walk() {
        let store = MemoryStore::new(100);
        let root = health_root(&store);
        let first = store.add_folder(&root, "blood");
        let second = store.add_folder(&root, "blood");
        store.add_file(&first, "b1", "a.pdf", PDF, b"");
        store.add_file(&second, "b2", "b.pdf", PDF, b"");

        let err = TreeWalker::default().walk(&store, "me/health").await.unwrap_err();
        assert!(matches!(err, RemoteError::AmbiguousFolder { ref segment, .. } if segment == "blood"));
    }

    #[tokio::test]
    async fn depth_bound_excludes_deep_files() {
        let store = MemoryStore::new(100);
        let root = health_root(&store);
        let mut folder = store.add_folder(&root, "blood");
        // Folders at depth 1..=6 below the typed subfolder.
        for depth in 1..=6 {
            folder = store.add_folder(&folder, &format!("level{depth}"));
            store.add_file(&folder, &format!("d{depth}"), "panel.pdf", PDF, b"");
        }

        let files = TreeWalker::default().walk(&store, "me/health").await.unwrap();
        let ids: Vec<&str> = files.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["d1", "d2", "d3", "d4", "d5"]);
        assert!(!ids.contains(&"d6"));
    }

    #[tokio::test]
    async fn pagination_is_exhausted() {
        let store = MemoryStore::new(2);
        let root = health_root(&store);
        for i in 0..5 {
            store.add_file(&root, &format!("f{i}"), &format!("doc{i}.pdf"), PDF, b"");
        }
        let files = TreeWalker::default().walk(&store, "me/health").await.unwrap();
        assert_eq!(files.len(), 5);
    }

    #[tokio::test]
    async fn subfolders_scanned_in_table_order() {
        let store = MemoryStore::new(100);
        let root = health_root(&store);
        let urine = store.add_folder(&root, "urine");
        let blood = store.add_folder(&root, "blood");
        store.add_file(&urine, "u1", "u.pdf", PDF, b"");
        store.add_file(&blood, "b1", "b.pdf", PDF, b"");

        let files = TreeWalker::default().walk(&store, "me/health").await.unwrap();
        let ids: Vec<&str> = files.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["b1", "u1"]);
    }

    #[tokio::test]
    async fn listing_error_aborts_walk() {
        let store = MemoryStore::new(100);
        let root = health_root(&store);
        store.add_file(&root, "f1", "labs.pdf", PDF, b"");
        *store.fail_listing.lock().unwrap() = true;
        assert!(TreeWalker::default().walk(&store, "me/health").await.is_err());
    }

    #[tokio::test]
    async fn missing_root_is_error() {
        let store = MemoryStore::new(100);
        let err = TreeWalker::default().walk(&store, "me/health").await.unwrap_err();
        assert!(matches!(err, RemoteError::FolderNotFound { .. }));
    }
}
