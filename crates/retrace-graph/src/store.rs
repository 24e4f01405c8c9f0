//! Graph stores
//!
//! A [`GraphStore`] keeps persisted graphs keyed by their description id.
//! [`MemoryStore`] lives for the process; [`JsonFileStore`] writes one JSON
//! file per graph into a directory.

use crate::error::StoreError;
use crate::persist::GraphDump;
use crate::types::GraphDesc;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Description and dump of one graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredGraph {
    /// Description
    pub desc: GraphDesc,
    /// Content
    pub dump: GraphDump,
}

/// Storage backend for persisted graphs
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Descriptions of all stored graphs
    async fn list(&self) -> Result<Vec<GraphDesc>, StoreError>;

    /// Load a graph
    async fn load(&self, id: &str) -> Result<StoredGraph, StoreError>;

    /// Insert or overwrite a graph
    async fn save(&self, graph: &StoredGraph) -> Result<(), StoreError>;

    /// Delete a graph; true if it existed
    async fn remove(&self, id: &str) -> Result<bool, StoreError>;
}

/// Process-local store
#[derive(Debug, Default)]
pub struct MemoryStore {
    graphs: DashMap<String, StoredGraph>,
}

impl MemoryStore {
    /// Empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored graphs
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    /// True if nothing is stored
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    async fn list(&self) -> Result<Vec<GraphDesc>, StoreError> {
        let mut descs: Vec<GraphDesc> = self.graphs.iter().map(|e| e.desc.clone()).collect();
        descs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(descs)
    }

    async fn load(&self, id: &str) -> Result<StoredGraph, StoreError> {
        self.graphs
            .get(id)
            .map(|e| e.value().clone())
            .ok_or_else(|| StoreError::NotFound(id.to_owned()))
    }

    async fn save(&self, graph: &StoredGraph) -> Result<(), StoreError> {
        self.graphs.insert(graph.desc.id.clone(), graph.clone());
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.graphs.remove(id).is_some())
    }
}

/// Store writing `{id}.json` files into a directory
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Store in `dir`; the directory is created on first save
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory of this store
    #[inline]
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_of(&self, id: &str) -> Result<PathBuf, StoreError> {
        if id.is_empty() || id.contains(['/', '\\']) || id.contains("..") {
            return Err(StoreError::InvalidId(id.to_owned()));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }

    async fn read(&self, path: &Path) -> Result<StoredGraph, StoreError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| StoreError::io(path, e))?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl GraphStore for JsonFileStore {
    async fn list(&self) -> Result<Vec<GraphDesc>, StoreError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&self.dir, e)),
        };

        let mut descs = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| StoreError::io(&self.dir, e))? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match self.read(&path).await {
                Ok(graph) => descs.push(graph.desc),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable graph file"),
            }
        }
        descs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(descs)
    }

    async fn load(&self, id: &str) -> Result<StoredGraph, StoreError> {
        let path = self.path_of(id)?;
        match self.read(&path).await {
            Err(StoreError::Io { source, .. }) if source.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(id.to_owned()))
            }
            other => other,
        }
    }

    async fn save(&self, graph: &StoredGraph) -> Result<(), StoreError> {
        let path = self.path_of(&graph.desc.id)?;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StoreError::io(&self.dir, e))?;

        // Write to a sibling file first so a crash never leaves half a graph
        let tmp = path.with_extension("json.tmp");
        let text = serde_json::to_string_pretty(graph)?;
        tokio::fs::write(&tmp, text).await.map_err(|e| StoreError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| StoreError::io(&path, e))?;
        tracing::debug!(path = %path.display(), "saved graph");
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let path = self.path_of(id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io(path, e)),
        }
    }
}
