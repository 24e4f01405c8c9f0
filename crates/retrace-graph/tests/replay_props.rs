use proptest::prelude::*;
use retrace_model::StateId;
use retrace_test_utils::*;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone)]
enum Op {
    Set(usize, u8),
    Undo,
    Redo,
    Jump(usize),
}

const NAMES: [&str; 3] = ["a", "b", "c"];

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..NAMES.len(), 0u8..5).prop_map(|(n, v)| Op::Set(n, v)),
        1 => Just(Op::Undo),
        1 => Just(Op::Redo),
        2 => any::<usize>().prop_map(Op::Jump),
    ]
}

/// Run `ops` and check after every step that the view matches what the
/// current state is known to contain
async fn run_ops(ops: Vec<Op>) -> Result<(), TestCaseError> {
    let fx = setup_graph();
    let mut expected: HashMap<StateId, BTreeMap<String, Value>> = HashMap::new();
    let mut visited = vec![fx.graph.root()];
    expected.insert(fx.graph.root(), BTreeMap::new());

    for op in ops {
        match op {
            Op::Set(n, v) => {
                let mut next = expected[&fx.graph.current()].clone();
                next.insert(NAMES[n].to_owned(), json!(v));
                let pushed = fx
                    .graph
                    .push(set_parameter(&fx.view, NAMES[n], json!(v)))
                    .await
                    .map_err(|e| TestCaseError::fail(e.to_string()))?;
                expected.insert(pushed.state, next);
                visited.push(pushed.state);
            }
            Op::Undo => {
                let before = fx.graph.current();
                let after = fx.graph.undo().await.map_err(|e| TestCaseError::fail(e.to_string()))?;
                if before == fx.graph.root() {
                    prop_assert_eq!(after, None);
                }
            }
            Op::Redo => {
                fx.graph.redo().await.map_err(|e| TestCaseError::fail(e.to_string()))?;
            }
            Op::Jump(i) => {
                let target = visited[i % visited.len()];
                fx.graph
                    .jump_to(target)
                    .await
                    .map_err(|e| TestCaseError::fail(e.to_string()))?;
                prop_assert_eq!(fx.graph.current(), target);
            }
        }

        let view = fx
            .view
            .downcast::<ParameterView>()
            .await
            .ok_or_else(|| TestCaseError::fail("view is detached"))?;
        prop_assert_eq!(&view.snapshot(), &expected[&fx.graph.current()]);
    }

    let dim = fx.graph.dim();
    prop_assert_eq!(dim.states, dim.actions + 1);
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_view_matches_state_after_navigation(ops in prop::collection::vec(op_strategy(), 1..40)) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(run_ops(ops))?;
    }

    #[test]
    fn prop_restore_preserves_structure(values in prop::collection::vec((0..NAMES.len(), 0u8..5), 0..12), back in 0usize..12) {
        let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        rt.block_on(async {
            let fx = setup_graph();
            for (n, v) in values {
                fx.graph.push(set_parameter(&fx.view, NAMES[n], json!(v))).await.unwrap();
            }
            for _ in 0..back {
                fx.graph.undo().await.unwrap();
            }
            let dump = fx.graph.persist();
            let copy = retrace_graph::ProvenanceGraph::in_memory(fx.registry.clone());
            copy.restore(dump.clone()).await.unwrap();
            prop_assert_eq!(copy.persist(), dump);
            prop_assert_eq!(copy.current_path().len(), fx.graph.current_path().len());
            Ok(())
        })?;
    }
}
