use spark_tree::{Key, Node, NodeOptions, TreeError};
use serde_json::json;
use std::cell::Cell;
use std::rc::Rc;

struct DropFlag(Rc<Cell<bool>>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.set(true);
    }
}

#[test]
fn test_detached_child_is_reclaimed_while_held() {
    let root = Node::new(json!({"k": 1}));
    let k = root.at("k");

    root.set(json!({}));
    assert_eq!(k.value(), None);
    assert_eq!(root.phantom_count(), 1);

    root.set(json!({"k": 5}));
    assert!(root.at("k").ptr_eq(&k), "re-attach should hand back the same node");
    assert_eq!(k.value(), Some(json!(5)));
    assert_eq!(root.phantom_count(), 0);
}

#[test]
fn test_dropped_phantom_is_not_resurrected() {
    let root = Node::new(json!({"k": 1}));
    let first_id = root.at("k").id();

    // Nothing holds the child after this, so detaching lets it go.
    root.set(json!({}));
    assert_eq!(root.phantom_count(), 0);

    root.set(json!({"k": 2}));
    assert_ne!(root.at("k").id(), first_id);
}

#[test]
fn test_watchers_survive_detach_and_reattach() {
    let root = Node::new(json!({"k": 1}));
    let k = root.at("k");
    let calls = Rc::new(Cell::new(0));

    let seen = calls.clone();
    let _unwatch = k.watch_sync(move |_, _| seen.set(seen.get() + 1));

    root.set(json!({})); // detach
    root.set(json!({"k": 3})); // attach
    k.set(json!(4)); // value

    assert_eq!(calls.get(), 3);
}

#[test]
fn test_dropping_the_root_frees_the_tree() {
    let dropped = Rc::new(Cell::new(false));
    {
        let root = Node::new(json!({"a": {"b": 1}}));
        let flag = DropFlag(dropped.clone());
        let _unwatch = root.at("a").at("b").watch(move |_, _| {
            let _ = &flag;
        });
        assert!(!dropped.get());
    }
    assert!(dropped.get(), "watchers deep in the tree should go with the root");
}

#[test]
fn test_phantom_keeps_its_container_alive() {
    let deep = {
        let root = Node::with_options(json!({}), NodeOptions::new().id("form"));
        root.at_path(["a", "b"])
    };

    // The root handle is gone, but the phantom chain still reaches it.
    assert_eq!(deep.root().id(), "form");
    assert_eq!(deep.path(), vec![Key::from("a"), Key::from("b")]);
}

#[test]
fn test_released_phantom_cannot_attach() {
    let root = Node::new(json!({}));
    let ghost = root.at("ghost");
    assert!(root.release_phantom("ghost"));
    assert_eq!(root.phantom_count(), 0);

    assert_eq!(
        ghost.try_set(json!(1), true),
        Err(TreeError::ChildNotRegistered { key: Key::from("ghost") })
    );
    // Navigation hands out a fresh node instead.
    assert!(!root.at("ghost").ptr_eq(&ghost));
}

#[test]
fn test_watcher_closure_dropped_with_node() {
    let dropped = Rc::new(Cell::new(false));
    {
        let node = Node::new(json!(0));
        let flag = DropFlag(dropped.clone());
        let _unwatch = node.watch(move |_, _| {
            let _ = &flag;
        });
    }

    assert!(dropped.get(), "watcher should be dropped with its node");
}

#[test]
fn test_unwatch_after_node_dropped_is_harmless() {
    let unwatch = {
        let node = Node::new(json!(0));
        node.watch(|_, _| {})
    };
    unwatch();
}

#[test]
fn test_finaliser_removes_registry_entry() {
    let root = Node::new(json!({}));
    {
        let _ghost = root.at("ghost");
        assert_eq!(root.phantom_count(), 1);
    }
    assert_eq!(root.phantom_count(), 0);
    assert!(root.phantom("ghost").is_none());
}
