use pretty_assertions::assert_eq;
use retrace_compression::{CancelPair, CompressorRegistry, LastOnly};
use retrace_graph::{
    DescPatch, GraphDesc, GraphDump, GraphEvent, GraphManager, GraphStore, JsonFileStore, ManagerConfig,
    MemoryStore, ProvenanceError, ProvenanceGraph, Slide, StoredGraph,
};
use retrace_model::{ObjectCategory, ObjectId, StateId};
use retrace_test_utils::*;
use serde_json::json;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

async fn linear_fixture() -> Fixture {
    let fx = setup_graph();
    fx.graph.push(set_parameter(&fx.view, "x", json!(1))).await.unwrap();
    fx.graph.push(add_score(&fx.board, "s")).await.unwrap();
    fx.graph.push(set_parameter(&fx.view, "x", json!(2))).await.unwrap();
    fx
}

fn registry() -> Arc<retrace_graph::StaticActionRegistry> {
    Arc::new(standard_registry(Arc::new(AtomicBool::new(false))))
}

#[tokio::test]
async fn restore_of_persist_is_identical() {
    let fx = linear_fixture().await;
    let dump = fx.graph.persist();

    let restored = ProvenanceGraph::in_memory(registry());
    restored.restore(dump.clone()).await.unwrap();

    assert_eq!(restored.persist(), dump);
    assert_eq!(restored.current(), fx.graph.current());
    assert_eq!(restored.dim(), fx.graph.dim());
    let f_ids: Vec<_> = restored.current_path().iter().map(|a| a.f_id().to_owned()).collect();
    assert_eq!(f_ids, vec![SET_PARAMETER, ADD_SCORE, SET_PARAMETER]);
}

#[tokio::test]
async fn dump_survives_json() {
    let fx = linear_fixture().await;
    let dump = fx.graph.persist();
    let text = dump.to_json().unwrap();
    assert_eq!(GraphDump::from_json(&text).unwrap(), dump);
}

#[tokio::test]
async fn restored_objects_are_reattached_lazily() {
    let fx = setup_graph();
    fx.graph.push(set_parameter(&fx.view, "x", json!(1))).await.unwrap();
    fx.graph.push(set_parameter(&fx.view, "x", json!(2))).await.unwrap();

    let restored = ProvenanceGraph::in_memory(registry());
    restored.restore(fx.graph.persist()).await.unwrap();
    let detached = restored.find_object(fx.view.id()).unwrap();
    assert!(detached.is_detached());

    // The application hands the object back; identity comes from the key
    let view = ParameterView::default();
    view.set("x", json!(2));
    let view = restored.add_object(view, "view", ObjectCategory::Visual);
    assert_eq!(view.id(), fx.view.id());
    assert!(!detached.is_detached());

    restored.undo().await.unwrap();
    assert_eq!(view_value(&view, "x").await, Some(json!(1)));
}

#[tokio::test]
async fn replay_after_restore_rebuilds_state() {
    let fx = linear_fixture().await;
    let target = fx.graph.current();

    let dump = fx.graph.persist();
    let restored = ProvenanceGraph::in_memory(registry());
    restored.restore(dump.clone()).await.unwrap();
    assert_eq!(restored.current(), target);
    assert_eq!(restored.applied(), restored.root());

    let view = restored.add_object(ParameterView::default(), "view", ObjectCategory::Visual);
    let board = restored.add_object(ScoreBoard::default(), "scores", ObjectCategory::Data);
    restored.jump_to(dump.current_state_id).await.unwrap();

    assert_eq!(view_value(&view, "x").await, Some(json!(2)));
    assert_eq!(board.downcast::<ScoreBoard>().await.unwrap().ids(), vec!["s".to_owned()]);
    assert_eq!(restored.applied(), target);
    assert_eq!(restored.persist(), dump);
}

#[tokio::test]
async fn manager_get_then_jump_replays_saved_state() {
    let manager = GraphManager::new(Arc::new(MemoryStore::new()), registry());
    let graph = manager.create_local(&DescPatch::new()).await.unwrap();
    let view = graph.add_object(ParameterView::default(), "view", ObjectCategory::Visual);
    graph.push(set_parameter(&view, "x", json!(1))).await.unwrap();
    graph.push(set_parameter(&view, "x", json!(5))).await.unwrap();
    manager.save(&graph).await.unwrap();

    let loaded = manager.get(&graph.id()).await.unwrap();
    let view = loaded.add_object(ParameterView::default(), "view", ObjectCategory::Visual);
    assert_eq!(view_value(&view, "x").await, None);
    loaded.jump_to(loaded.current()).await.unwrap();
    assert_eq!(view_value(&view, "x").await, Some(json!(5)));
}

#[tokio::test]
async fn restore_rejects_ids_that_leave_no_room() {
    let fx = linear_fixture().await;
    let before = fx.graph.persist();

    let mut bad = before.clone();
    bad.objects[0].id = ObjectId(u64::MAX);
    assert!(matches!(
        fx.graph.restore(bad).await,
        Err(ProvenanceError::InvalidDump(_))
    ));
    assert_eq!(fx.graph.persist(), before);
}

#[tokio::test]
async fn invalid_dump_leaves_graph_untouched() {
    let fx = linear_fixture().await;
    let before = fx.graph.persist();

    let mut bad = before.clone();
    bad.current_state_id = StateId(999);
    let err = fx.graph.restore(bad).await.unwrap_err();
    assert!(matches!(err, ProvenanceError::InvalidDump(_)));

    let mut orphan = before.clone();
    orphan.actions.pop();
    assert!(fx.graph.restore(orphan).await.is_err());

    assert_eq!(fx.graph.persist(), before);
    assert!(!fx.view.is_detached());
}

#[tokio::test]
async fn ids_continue_after_restore() {
    let fx = linear_fixture().await;
    let dump = fx.graph.persist();
    let max = dump.max_id().unwrap();

    let restored = ProvenanceGraph::in_memory(registry());
    restored.restore(dump).await.unwrap();
    let view = restored.add_object(ParameterView::default(), "view", ObjectCategory::Visual);
    let pushed = restored.push(set_parameter(&view, "z", json!(0))).await.unwrap();
    assert!(pushed.action.get() > max);
    assert!(pushed.state.get() > max);
}

#[tokio::test]
async fn restore_emits_restored_event() {
    let fx = linear_fixture().await;
    let restored = ProvenanceGraph::in_memory(registry());
    let mut events = restored.subscribe();
    restored.restore(fx.graph.persist()).await.unwrap();
    assert_eq!(
        events.recv().await.unwrap(),
        GraphEvent::Restored {
            current: fx.graph.current()
        }
    );
}

#[tokio::test]
async fn cancel_pair_export() {
    let fx = setup_graph();
    fx.graph.push(add_score(&fx.board, "s")).await.unwrap();
    fx.graph.push(set_parameter(&fx.view, "x", json!(1))).await.unwrap();
    fx.graph.push(remove_score(&fx.board, "s")).await.unwrap();

    let compressors = CompressorRegistry::new()
        .with("(addScore|removeScore)", CancelPair::new(ADD_SCORE, REMOVE_SCORE))
        .unwrap()
        .with(SET_PARAMETER, LastOnly::per_parameter(SET_PARAMETER, "name"))
        .unwrap();
    let export = fx.graph.export_compressed(&compressors);

    assert_eq!(export.actions.len(), 1);
    assert_eq!(export.actions[0].f_id, SET_PARAMETER);
    assert!(export.actions.iter().all(|a| a.inverse.is_none()));
    assert_eq!(export.states.len(), 2);

    // The export is a valid dump on its own
    let imported = ProvenanceGraph::in_memory(registry());
    imported.restore(export.clone()).await.unwrap();
    assert_eq!(imported.dim().actions, 1);
    assert_eq!(imported.current(), export.current_state_id);
}

#[tokio::test]
async fn stories_play_and_persist() {
    let fx = setup_graph();
    let s1 = fx.graph.push(set_parameter(&fx.view, "x", json!(1))).await.unwrap().state;
    let s2 = fx.graph.push(set_parameter(&fx.view, "x", json!(2))).await.unwrap().state;

    let story = fx.graph.extract_story("", &[s1, s2], true).unwrap();
    let slides = fx.graph.story(story).unwrap().slides;
    assert_eq!(slides.len(), 4);
    assert_eq!(slides[0], Slide::text("Unnamed Story", "Unnamed Story"));
    assert_eq!(slides[1].state, Some(s1));
    assert_eq!(slides[3].text.as_deref(), Some("Thanks"));

    fx.graph.play_slide(story, 1).await.unwrap();
    assert_eq!(fx.graph.current(), s1);
    assert_eq!(fx.value("x").await, Some(json!(1)));
    fx.graph.play_slide(story, 0).await.unwrap();
    assert_eq!(fx.graph.current(), s1);
    assert!(matches!(
        fx.graph.play_slide(story, 9).await,
        Err(ProvenanceError::SlideOutOfRange { index: 9, .. })
    ));

    let restored = ProvenanceGraph::in_memory(registry());
    restored.restore(fx.graph.persist()).await.unwrap();
    assert_eq!(restored.stories(), fx.graph.stories());

    fx.graph.remove_story(story).unwrap();
    assert!(fx.graph.stories().is_empty());
    assert!(matches!(
        fx.graph.remove_story(story),
        Err(ProvenanceError::StoryNotFound(_))
    ));
}

#[tokio::test]
async fn extract_story_rejects_unknown_states() {
    let fx = setup_graph();
    assert!(matches!(
        fx.graph.extract_story("t", &[StateId(77)], false),
        Err(ProvenanceError::StateNotFound(_))
    ));
}

// ---------------------------------------------------------------
// Graph manager
// ---------------------------------------------------------------

#[tokio::test]
async fn manager_creates_sequential_local_graphs() {
    let dir = tempfile::tempdir().unwrap();
    let manager = GraphManager::new(Arc::new(JsonFileStore::new(dir.path())), registry());

    let first = manager.create_local(&DescPatch::new()).await.unwrap();
    let second = manager.create_local(&DescPatch::new().name("Mine")).await.unwrap();
    assert_eq!(first.id(), "retrace1");
    assert_eq!(first.desc().name, "Temporary Session 1");
    assert_eq!(second.id(), "retrace2");
    assert_eq!(second.desc().name, "Mine");
    assert!(dir.path().join("retrace1.json").exists());

    let listed: Vec<_> = manager.list().await.unwrap().into_iter().map(|d| d.id).collect();
    assert_eq!(listed, vec!["retrace1", "retrace2"]);
}

#[tokio::test]
async fn manager_saves_and_loads_through_files() {
    let dir = tempfile::tempdir().unwrap();
    let manager = GraphManager::new(Arc::new(JsonFileStore::new(dir.path())), registry());

    let graph = manager.create_local(&DescPatch::new()).await.unwrap();
    let view = graph.add_object(ParameterView::default(), "view", ObjectCategory::Visual);
    graph.push(set_parameter(&view, "x", json!(1))).await.unwrap();
    graph.push(set_parameter(&view, "x", json!(2))).await.unwrap();
    let saved = manager.save(&graph).await.unwrap();
    assert_eq!(saved.size.actions, 2);

    let loaded = manager.get(&graph.id()).await.unwrap();
    assert_eq!(loaded.persist(), graph.persist());
    assert_eq!(loaded.desc().name, graph.desc().name);

    let edited = manager.edit(&graph.id(), &DescPatch::new().description("notes")).await.unwrap();
    assert_eq!(edited.description, "notes");
    assert_eq!(manager.get(&graph.id()).await.unwrap().desc().description, "notes");

    assert!(manager.delete(&graph.id()).await.unwrap());
    assert!(matches!(
        manager.get(&graph.id()).await,
        Err(ProvenanceError::Store(retrace_graph::StoreError::NotFound(_)))
    ));
}

#[tokio::test]
async fn manager_clones_keep_content_and_credit_source() {
    let manager = GraphManager::new(Arc::new(MemoryStore::new()), registry());
    let graph = manager.create_local(&DescPatch::new()).await.unwrap();
    let view = graph.add_object(ParameterView::default(), "view", ObjectCategory::Visual);
    graph.push(set_parameter(&view, "x", json!(1))).await.unwrap();

    let clone = manager.clone_graph(&graph, &DescPatch::new()).await.unwrap();
    let desc = clone.desc();
    assert_eq!(desc.name, "Clone of Temporary Session 1");
    assert!(desc
        .description
        .starts_with("Cloned from Temporary Session 1 created by anonymous"));
    assert_ne!(clone.id(), graph.id());
    assert_eq!(clone.persist(), graph.persist());

    let again = manager.clone_graph(&clone, &DescPatch::new()).await.unwrap();
    assert_eq!(again.desc().name, "Clone of Temporary Session 1");

    let memory = manager.clone_in_memory(&graph).await.unwrap();
    assert_eq!(memory.id(), "memory");
    assert_eq!(memory.dim().actions, 1);
    assert_eq!(manager.list().await.unwrap().len(), 3);
}

#[tokio::test]
async fn manager_imports_and_migrates() {
    let store = Arc::new(MemoryStore::new());
    let manager = GraphManager::new(store.clone(), registry());

    let scratch = manager.create_in_memory();
    let view = scratch.add_object(ParameterView::default(), "view", ObjectCategory::Visual);
    scratch.push(set_parameter(&view, "x", json!(1))).await.unwrap();

    let imported = manager.import(scratch.persist(), &DescPatch::new()).await.unwrap();
    assert_eq!(imported.dim().actions, 1);
    assert!(store.load(&imported.id()).await.is_ok());

    let desc = manager.migrate(&scratch, false, &DescPatch::new().name("Shared")).await.unwrap();
    assert_eq!(desc.name, "Shared");
    assert!(!desc.local);
    assert_eq!(scratch.id(), desc.id);
    assert_eq!(store.load(&desc.id).await.unwrap().dump, scratch.persist());
}

#[tokio::test]
async fn manager_lists_only_its_application() {
    let store = Arc::new(MemoryStore::new());
    let ours = GraphManager::new(store.clone(), registry());
    let theirs = GraphManager::new(store.clone(), registry())
        .with_config(ManagerConfig::new().with_application("other").with_prefix("other"));

    ours.create_local(&DescPatch::new()).await.unwrap();
    theirs.create_local(&DescPatch::new()).await.unwrap();

    assert_eq!(store.len(), 2);
    assert_eq!(ours.list().await.unwrap().len(), 1);
    assert_eq!(theirs.list().await.unwrap()[0].application, "other");
}

#[tokio::test]
async fn manager_reports_exhausted_ids() {
    let store = Arc::new(MemoryStore::new());
    let full = StoredGraph {
        desc: GraphDesc::new(format!("retrace{}", u64::MAX), "Last").with_application("retrace"),
        dump: ProvenanceGraph::in_memory(registry()).persist(),
    };
    store.save(&full).await.unwrap();

    let manager = GraphManager::new(store.clone(), registry());
    assert!(matches!(
        manager.create_local(&DescPatch::new()).await,
        Err(ProvenanceError::Store(retrace_graph::StoreError::IdsExhausted(_)))
    ));
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn stories_are_edited_in_place() {
    let fx = setup_graph();
    let s1 = fx.graph.push(set_parameter(&fx.view, "x", json!(1))).await.unwrap().state;
    let s2 = fx.graph.push(set_parameter(&fx.view, "x", json!(2))).await.unwrap().state;

    let story = fx.graph.start_story("Walkthrough", &[s1]).unwrap();
    let mut events = fx.graph.subscribe();
    fx.graph.append_slide(story, Slide::of_state("second", s2)).unwrap();
    fx.graph.insert_slide(story, 1, Slide::text("note", "look here")).unwrap();
    fx.graph.move_slide(story, 3, 1).unwrap();
    assert_eq!(events.recv().await.unwrap(), GraphEvent::StoryChanged { story });

    let slides = fx.graph.story(story).unwrap().slides;
    assert_eq!(slides.len(), 4);
    assert_eq!(slides[0], Slide::text("Walkthrough", "Walkthrough"));
    assert_eq!(slides[1].state, Some(s2));
    assert_eq!(slides[2].name, "note");
    assert_eq!(slides[3].state, Some(s1));

    assert_eq!(fx.graph.set_slide_target(story, 1, Some(s1)).unwrap(), Some(s2));
    fx.graph.play_slide(story, 1).await.unwrap();
    assert_eq!(fx.graph.current(), s1);

    // Rejected edits leave the story as it was
    let before = fx.graph.story(story).unwrap();
    assert!(matches!(
        fx.graph.set_slide_target(story, 0, Some(StateId(999))),
        Err(ProvenanceError::StateNotFound(_))
    ));
    assert!(matches!(
        fx.graph.remove_slide(story, 9),
        Err(ProvenanceError::SlideOutOfRange { index: 9, .. })
    ));
    assert_eq!(fx.graph.story(story).unwrap(), before);

    assert_eq!(fx.graph.remove_slide(story, 2).unwrap().text.as_deref(), Some("look here"));
    let restored = ProvenanceGraph::in_memory(registry());
    restored.restore(fx.graph.persist()).await.unwrap();
    assert_eq!(restored.story(story), fx.graph.story(story));
}
