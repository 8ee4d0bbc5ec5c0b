use std::collections::HashMap;
use std::path::{Path, PathBuf};

use testvista_explorer::{ExplorerHost, NodeFields, Reconciler};
use testvista_model::{
    CrateNode, ModuleNode, Session, SourceRange, TargetKind, TargetNode, TestId,
};
use testvista_protocol::{
    AppendItem, AppendPatch, DeletePatch, DeltaUpdate, UpdatePatch, UpdatePayload,
};
use testvista_sync::SyncEngine;

/// Minimal stand-in for a host widget tree: flat id-keyed store plus an
/// operation log. Removal is transitive, as the [`ExplorerHost`] contract
/// requires.
#[derive(Default)]
struct FakeHost {
    labels: HashMap<TestId, String>,
    children: HashMap<TestId, Vec<TestId>>,
    ops: Vec<String>,
}

impl ExplorerHost for FakeHost {
    fn create_node(&mut self, parent: &TestId, id: &TestId, label: &str, _location: Option<&Path>) {
        self.labels.insert(id.clone(), label.to_string());
        self.children
            .entry(parent.clone())
            .or_default()
            .push(id.clone());
        self.ops.push(format!("create {id} under {parent}"));
    }

    fn remove_node(&mut self, id: &TestId) {
        self.ops.push(format!("remove {id}"));
        let mut queue = vec![id.clone()];
        while let Some(current) = queue.pop() {
            self.labels.remove(&current);
            queue.extend(self.children.remove(&current).unwrap_or_default());
        }
        for list in self.children.values_mut() {
            list.retain(|child| child != id);
        }
    }

    fn update_node(&mut self, id: &TestId, fields: &NodeFields) {
        if let Some(label) = &fields.label {
            self.labels.insert(id.clone(), label.clone());
        }
        self.ops.push(format!("update {id}"));
    }
}

fn crate_item(id: &str, name: &str) -> AppendItem {
    AppendItem::Crate(CrateNode {
        id: TestId::new(id),
        name: name.to_string(),
        location: PathBuf::from(format!("crates/{name}")),
        modules: Vec::new(),
    })
}

fn module_item(id: &str, name: &str) -> AppendItem {
    AppendItem::Module(ModuleNode {
        id: TestId::new(id),
        name: name.to_string(),
        location: PathBuf::from("src/lib.rs"),
        modules: Vec::new(),
        targets: Vec::new(),
    })
}

fn target_item(id: &str, name: &str) -> AppendItem {
    AppendItem::Target(TargetNode {
        id: TestId::new(id),
        name: name.to_string(),
        location: PathBuf::from("src/lib.rs"),
        range: SourceRange::default(),
        kind: TargetKind::Test,
    })
}

fn append(target: &str, item: AppendItem) -> AppendPatch {
    let target_id = if target == "root" {
        TestId::session().clone()
    } else {
        TestId::new(target)
    };
    AppendPatch { target_id, item }
}

#[test]
fn seed_projects_the_whole_model_once() {
    let mut engine = SyncEngine::new(Session::new());
    engine
        .apply(DeltaUpdate {
            append: vec![
                append("root", crate_item("c1", "alpha")),
                append("c1", module_item("m1", "tests")),
                append("m1", target_item("t1", "first")),
            ],
            ..DeltaUpdate::default()
        })
        .unwrap();

    let mut reconciler = Reconciler::new();
    let mut host = FakeHost::default();
    reconciler.seed(engine.session(), &mut host);

    assert_eq!(host.ops.len(), 3);
    assert_eq!(host.labels.get(&TestId::new("m1")).unwrap(), "tests");
    assert_eq!(reconciler.mirror().shape(), engine.session().shape());
}

#[test]
fn shapes_stay_equal_across_a_delta_sequence() {
    let mut engine = SyncEngine::new(SessionInit::populated());
    let mut reconciler = Reconciler::new();
    let mut host = FakeHost::default();
    reconciler.seed(engine.session(), &mut host);

    let batches = vec![
        // Grow an unrelated crate while renaming inside the first.
        DeltaUpdate {
            update: vec![UpdatePatch {
                target_id: TestId::new("t1"),
                payload: UpdatePayload {
                    name: Some("first_renamed".to_string()),
                    ..UpdatePayload::default()
                },
            }],
            append: vec![
                append("root", crate_item("c2", "beta")),
                append("c2", module_item("m9", "smoke")),
                append("m9", target_item("t9", "probe")),
            ],
            ..DeltaUpdate::default()
        },
        // Drop a nested module, add a sibling target.
        DeltaUpdate {
            delete: vec![DeletePatch {
                target_id: TestId::new("m2"),
            }],
            append: vec![append("m1", target_item("t4", "late"))],
            ..DeltaUpdate::default()
        },
        // Remove a whole crate.
        DeltaUpdate {
            delete: vec![DeletePatch {
                target_id: TestId::new("c1"),
            }],
            ..DeltaUpdate::default()
        },
    ];

    for batch in batches {
        let diff = engine.apply(batch).unwrap();
        reconciler.apply(&diff, engine.session(), &mut host);
        assert_eq!(reconciler.mirror().shape(), engine.session().shape());
    }

    // The external store converged too: only the surviving crate remains.
    assert!(host.labels.contains_key(&TestId::new("c2")));
    assert!(!host.labels.contains_key(&TestId::new("c1")));
    assert!(!host.labels.contains_key(&TestId::new("t4")));
}

#[test]
fn incremental_updates_do_not_rebuild_the_tree() {
    let mut engine = SyncEngine::new(SessionInit::populated());
    let mut reconciler = Reconciler::new();
    let mut host = FakeHost::default();
    reconciler.seed(engine.session(), &mut host);
    let seeded_ops = host.ops.len();

    let diff = engine
        .apply(DeltaUpdate {
            update: vec![UpdatePatch {
                target_id: TestId::new("m1"),
                payload: UpdatePayload {
                    name: Some("renamed".to_string()),
                    ..UpdatePayload::default()
                },
            }],
            ..DeltaUpdate::default()
        })
        .unwrap();
    reconciler.apply(&diff, engine.session(), &mut host);

    assert_eq!(host.ops.len(), seeded_ops + 1);
    assert_eq!(host.ops.last().unwrap(), "update m1");
    assert_eq!(host.labels.get(&TestId::new("m1")).unwrap(), "renamed");
}

#[test]
fn node_created_and_deleted_in_one_batch_never_reaches_the_host() {
    let mut engine = SyncEngine::new(SessionInit::populated());
    let mut reconciler = Reconciler::new();
    let mut host = FakeHost::default();
    reconciler.seed(engine.session(), &mut host);
    let seeded_ops = host.ops.len();

    let diff = engine
        .apply(DeltaUpdate {
            append: vec![append("m1", target_item("ephemeral", "gone"))],
            delete: vec![DeletePatch {
                target_id: TestId::new("ephemeral"),
            }],
            ..DeltaUpdate::default()
        })
        .unwrap();
    reconciler.apply(&diff, engine.session(), &mut host);

    assert_eq!(host.ops.len(), seeded_ops);
    assert!(!host.labels.contains_key(&TestId::new("ephemeral")));
    assert_eq!(reconciler.mirror().shape(), engine.session().shape());
}

/// Builds Session → Crate(c1) → Module(m1) → { Module(m2) → Target(t3),
/// Target(t1), Target(t2) } without going through the engine.
struct SessionInit;

impl SessionInit {
    fn populated() -> Session {
        let target = |id: &str, name: &str| TargetNode {
            id: TestId::new(id),
            name: name.to_string(),
            location: PathBuf::from("src/lib.rs"),
            range: SourceRange::default(),
            kind: TargetKind::Test,
        };
        Session {
            crates: vec![CrateNode {
                id: TestId::new("c1"),
                name: "alpha".to_string(),
                location: PathBuf::from("crates/alpha"),
                modules: vec![ModuleNode {
                    id: TestId::new("m1"),
                    name: "tests".to_string(),
                    location: PathBuf::from("src/tests.rs"),
                    modules: vec![ModuleNode {
                        id: TestId::new("m2"),
                        name: "nested".to_string(),
                        location: PathBuf::from("src/tests.rs"),
                        modules: Vec::new(),
                        targets: vec![target("t3", "deep")],
                    }],
                    targets: vec![target("t1", "first"), target("t2", "second")],
                }],
            }],
        }
    }
}
