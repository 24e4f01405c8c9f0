//! Graph manager
//!
//! Lifecycle of provenance graphs against a [`GraphStore`]: create, list,
//! load, save, delete, clone, import, edit and migrate. The manager treats a
//! graph as an opaque unit and only talks to it through
//! [`persist`](ProvenanceGraph::persist) and
//! [`restore`](ProvenanceGraph::restore).

use crate::config::{GraphConfig, ManagerConfig};
use crate::error::{ProvenanceError, StoreError};
use crate::graph::ProvenanceGraph;
use crate::persist::GraphDump;
use crate::registry::ActionRegistry;
use crate::store::{GraphStore, StoredGraph};
use crate::types::{DescPatch, GraphDesc};
use std::fmt;
use std::sync::Arc;

const CLONE_PREFIX: &str = "Clone of ";

/// Creates, stores and loads provenance graphs
pub struct GraphManager {
    config: ManagerConfig,
    graph_config: GraphConfig,
    store: Arc<dyn GraphStore>,
    registry: Arc<dyn ActionRegistry>,
    /// Serializes id allocation with the first save
    create: tokio::sync::Mutex<()>,
}

impl GraphManager {
    /// Manager with default configuration
    #[must_use]
    pub fn new(store: Arc<dyn GraphStore>, registry: Arc<dyn ActionRegistry>) -> Self {
        Self {
            config: ManagerConfig::default(),
            graph_config: GraphConfig::default(),
            store,
            registry,
            create: tokio::sync::Mutex::new(()),
        }
    }

    /// With manager configuration
    #[inline]
    #[must_use]
    pub fn with_config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    /// With configuration for the graphs it creates
    #[inline]
    #[must_use]
    pub fn with_graph_config(mut self, config: GraphConfig) -> Self {
        self.graph_config = config;
        self
    }

    /// Manager configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Descriptions of the stored graphs of this application
    ///
    /// # Errors
    /// Returns error if the store fails
    pub async fn list(&self) -> Result<Vec<GraphDesc>, ProvenanceError> {
        let all = self.store.list().await?;
        Ok(all
            .into_iter()
            .filter(|d| d.application == self.config.application)
            .collect())
    }

    /// Load a stored graph. Only the structure is restored.
    ///
    /// # Errors
    /// Returns error if the graph does not exist or its dump is invalid
    pub async fn get(&self, id: &str) -> Result<ProvenanceGraph, ProvenanceError> {
        let StoredGraph { desc, dump } = self.store.load(id).await?;
        tracing::info!(graph = id, "loading graph");
        ProvenanceGraph::from_dump(desc, dump, Arc::clone(&self.registry), self.graph_config.clone()).await
    }

    /// Persist a graph into the store
    ///
    /// # Errors
    /// Returns error if the store fails
    pub async fn save(&self, graph: &ProvenanceGraph) -> Result<GraphDesc, ProvenanceError> {
        let dump = graph.persist();
        let mut desc = graph.desc();
        desc.size = graph.dim();
        self.store
            .save(&StoredGraph {
                desc: desc.clone(),
                dump,
            })
            .await?;
        tracing::debug!(graph = %desc.id, "saved graph");
        Ok(desc)
    }

    /// Delete a stored graph; true if it existed
    ///
    /// # Errors
    /// Returns error if the store fails
    pub async fn delete(&self, id: &str) -> Result<bool, ProvenanceError> {
        let removed = self.store.remove(id).await?;
        tracing::info!(graph = id, removed, "deleted graph");
        Ok(removed)
    }

    /// Create and store an empty local graph
    ///
    /// # Errors
    /// Returns error if the store fails
    pub async fn create_local(&self, patch: &DescPatch) -> Result<ProvenanceGraph, ProvenanceError> {
        let _create = self.create.lock().await;
        let desc = self.fresh_desc(true, patch).await?;
        tracing::info!(graph = %desc.id, "creating local graph");
        let graph = self.graph(desc);
        self.save(&graph).await?;
        Ok(graph)
    }

    /// Empty graph that is never stored
    #[must_use]
    pub fn create_in_memory(&self) -> ProvenanceGraph {
        let desc = GraphDesc::new("memory", "In Memory Session")
            .with_creator(self.config.creator.clone())
            .with_application(self.config.application.clone())
            .with_permissions(self.config.default_permissions);
        self.graph(desc)
    }

    /// Unstored copy of `graph`
    ///
    /// # Errors
    /// Returns error if the copy cannot be restored
    pub async fn clone_in_memory(&self, graph: &ProvenanceGraph) -> Result<ProvenanceGraph, ProvenanceError> {
        let copy = self.create_in_memory();
        copy.restore(graph.persist()).await?;
        Ok(copy)
    }

    /// Stored copy of `graph`, named after the original
    ///
    /// # Errors
    /// Returns error if the store fails
    pub async fn clone_graph(
        &self,
        graph: &ProvenanceGraph,
        patch: &DescPatch,
    ) -> Result<ProvenanceGraph, ProvenanceError> {
        let source = graph.desc();
        let name = if source.name.contains(CLONE_PREFIX) {
            source.name.clone()
        } else {
            format!("{CLONE_PREFIX}{}", source.name)
        };
        let description = format!(
            "Cloned from {} created by {}\n{}",
            source.name, source.creator, source.description
        );
        let patch = DescPatch {
            name: patch.name.clone().or(Some(name)),
            description: patch.description.clone().or(Some(description)),
            ..patch.clone()
        };
        self.import(graph.persist(), &patch).await
    }

    /// Store a new local graph with the content of `dump`
    ///
    /// # Errors
    /// Returns error if the dump is invalid or the store fails
    pub async fn import(&self, dump: GraphDump, patch: &DescPatch) -> Result<ProvenanceGraph, ProvenanceError> {
        let _create = self.create.lock().await;
        let desc = self.fresh_desc(true, patch).await?;
        tracing::info!(graph = %desc.id, "importing graph");
        let graph = self.graph(desc);
        graph.restore(dump).await?;
        self.save(&graph).await?;
        Ok(graph)
    }

    /// Change the description of a stored graph
    ///
    /// # Errors
    /// Returns error if the graph does not exist or the store fails
    pub async fn edit(&self, id: &str, patch: &DescPatch) -> Result<GraphDesc, ProvenanceError> {
        let mut stored = self.store.load(id).await?;
        stored.desc.apply(patch);
        self.store.save(&stored).await?;
        Ok(stored.desc)
    }

    /// Move `graph` to new storage under a fresh id and switch its
    /// description over. The graph's content is untouched.
    ///
    /// # Errors
    /// Returns error if the store fails
    pub async fn migrate(
        &self,
        graph: &ProvenanceGraph,
        local: bool,
        patch: &DescPatch,
    ) -> Result<GraphDesc, ProvenanceError> {
        let _create = self.create.lock().await;
        let fresh = self.fresh_desc(local, patch).await?;
        let old = graph.desc();
        let mut desc = GraphDesc {
            id: fresh.id,
            local,
            ..old.clone()
        };
        desc.apply(patch);
        tracing::info!(from = %old.id, to = %desc.id, local, "migrating graph");
        graph.set_desc(desc);
        self.save(graph).await
    }

    fn graph(&self, desc: GraphDesc) -> ProvenanceGraph {
        ProvenanceGraph::new(desc, Arc::clone(&self.registry), self.graph_config.clone())
    }

    /// Description with the next free `{prefix}{n}` id
    async fn fresh_desc(&self, local: bool, patch: &DescPatch) -> Result<GraphDesc, ProvenanceError> {
        let prefix = &self.config.prefix;
        let max = self
            .store
            .list()
            .await?
            .iter()
            .filter_map(|d| d.id.strip_prefix(prefix.as_str()))
            .filter_map(|n| n.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        let n = max
            .checked_add(1)
            .ok_or_else(|| StoreError::IdsExhausted(prefix.clone()))?;

        let mut desc = GraphDesc::new(format!("{prefix}{n}"), format!("Temporary Session {n}"))
            .with_creator(self.config.creator.clone())
            .with_application(self.config.application.clone())
            .with_permissions(self.config.default_permissions)
            .with_local(local);
        desc.apply(patch);
        Ok(desc)
    }
}

impl fmt::Debug for GraphManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphManager")
            .field("config", &self.config)
            .field("graph_config", &self.graph_config)
            .finish_non_exhaustive()
    }
}
