//! Reading graphs from disk

use anyhow::Context;
use retrace_graph::{GraphDesc, GraphDump, ProvenanceGraph, RetraceConfig, StaticActionRegistry, StoredGraph};
use std::path::Path;
use std::sync::Arc;

/// Parse a stored graph record, or a bare dump named after its file
pub(crate) fn parse(path: &Path, text: &str) -> anyhow::Result<StoredGraph> {
    if let Ok(stored) = serde_json::from_str::<StoredGraph>(text) {
        return Ok(stored);
    }
    let dump = GraphDump::from_json(text).with_context(|| format!("{} is neither a stored graph nor a dump", path.display()))?;
    let stem = path
        .file_stem()
        .map_or_else(|| String::from("dump"), |s| s.to_string_lossy().into_owned());
    Ok(StoredGraph {
        desc: GraphDesc::new(stem.clone(), stem),
        dump,
    })
}

/// Rebuild the structure of the graph in `path`. No executors are
/// registered, so the result can be inspected and exported but not
/// navigated.
pub(crate) async fn load(path: &Path, config: &RetraceConfig) -> anyhow::Result<ProvenanceGraph> {
    let text = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let StoredGraph { desc, dump } = parse(path, &text)?;
    tracing::debug!(path = %path.display(), graph = %desc.id, states = dump.states.len(), "loaded graph file");
    let graph = ProvenanceGraph::from_dump(desc, dump, Arc::new(StaticActionRegistry::new()), config.graph.clone())
        .await
        .with_context(|| format!("invalid graph in {}", path.display()))?;
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use retrace_test_utils::{set_parameter, setup_graph};
    use serde_json::json;

    #[tokio::test]
    async fn loads_bare_dump() {
        let fx = setup_graph();
        fx.graph.push(set_parameter(&fx.view, "x", json!(1))).await.unwrap();
        let dump = fx.graph.persist();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, dump.to_json().unwrap()).unwrap();

        let graph = load(&path, &RetraceConfig::default()).await.unwrap();
        assert_eq!(graph.id(), "session");
        assert_eq!(graph.persist(), dump);
    }

    #[tokio::test]
    async fn loads_stored_graph() {
        let fx = setup_graph();
        fx.graph.push(set_parameter(&fx.view, "x", json!(1))).await.unwrap();
        let stored = StoredGraph {
            desc: GraphDesc::new("retrace7", "Shared"),
            dump: fx.graph.persist(),
        };

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("retrace7.json");
        std::fs::write(&path, serde_json::to_string(&stored).unwrap()).unwrap();

        let graph = load(&path, &RetraceConfig::default()).await.unwrap();
        assert_eq!(graph.desc().name, "Shared");
        assert_eq!(graph.dim().actions, 1);
    }

    #[test]
    fn rejects_other_json() {
        let err = parse(Path::new("x.json"), "{\"hello\": 1}").unwrap_err();
        assert!(err.to_string().contains("neither a stored graph nor a dump"));
    }
}
