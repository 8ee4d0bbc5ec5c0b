//! Incremental reconciliation of the model tree onto an externally-owned
//! explorer surface.
//! （將模型樹增量調和到外部擁有的測試瀏覽介面。）
//!
//! The host owns the real widget tree; this crate only issues minimal
//! create/remove/update calls against it and keeps an id-only shape mirror
//! so later deltas and run-status lookups can be resolved without touching
//! the host.
//! （實際的元件樹由宿主擁有；本模組只對其發出最少量的建立/移除/更新呼叫，
//! 並維護一份僅含識別碼的形狀鏡像，讓後續增量與執行狀態查詢不需回問宿主。）

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};

use tracing::debug;

use testvista_model::{NodeIndex, NodeRef, Session, TestId, TreeDiff};

/// Presentation fields pushed to the host on an update.
/// （更新時推送給宿主的顯示欄位。）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeFields {
    pub label: Option<String>,
    pub location: Option<PathBuf>,
}

/// Operations the externally-owned explorer surface must support.
/// （外部瀏覽介面必須支援的操作。）
///
/// Removing a node removes its whole visual subtree; hosts with flat node
/// stores must implement that transitively.
/// （移除節點時需連同其視覺子樹一併移除；以平面儲存節點的宿主須自行遞移處理。）
pub trait ExplorerHost {
    fn create_node(&mut self, parent: &TestId, id: &TestId, label: &str, location: Option<&Path>);
    fn remove_node(&mut self, id: &TestId);
    fn update_node(&mut self, id: &TestId, fields: &NodeFields);
}

/// Id-only mirror of the external tree's shape.
/// （外部樹形狀的純識別碼鏡像。）
#[derive(Debug, Clone, Default)]
pub struct MirrorTree {
    /// Ordered children per parent; the session root is keyed like any node.
    /// （每個父節點的有序子節點清單；根節點與一般節點同樣作為索引鍵。）
    children: HashMap<TestId, Vec<TestId>>,
    parents: HashMap<TestId, TestId>,
}

impl MirrorTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &TestId) -> bool {
        id.is_session() || self.parents.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    pub fn parent_of(&self, id: &TestId) -> Option<&TestId> {
        self.parents.get(id)
    }

    pub fn children_of(&self, id: &TestId) -> &[TestId] {
        self.children.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The (parent id, node id) relation, comparable against
    /// [`Session::shape`].
    /// （可與 [`Session::shape`] 比較的（父節點、節點）關係集合。）
    pub fn shape(&self) -> BTreeSet<(TestId, TestId)> {
        self.parents
            .iter()
            .map(|(id, parent)| (parent.clone(), id.clone()))
            .collect()
    }

    fn insert(&mut self, parent: &TestId, id: &TestId) {
        self.children
            .entry(parent.clone())
            .or_default()
            .push(id.clone());
        self.parents.insert(id.clone(), parent.clone());
    }

    /// Detaches `id` and everything below it, returning the removed ids.
    /// （卸除 `id` 與其所有後代，並回傳被移除的識別碼。）
    fn remove_subtree(&mut self, id: &TestId) -> Vec<TestId> {
        let Some(parent) = self.parents.remove(id) else {
            return Vec::new();
        };
        if let Some(siblings) = self.children.get_mut(&parent) {
            siblings.retain(|sibling| sibling != id);
        }
        let mut removed = Vec::new();
        let mut queue = VecDeque::from([id.clone()]);
        while let Some(current) = queue.pop_front() {
            for child in self.children.remove(&current).unwrap_or_default() {
                self.parents.remove(&child);
                queue.push_back(child);
            }
            removed.push(current);
        }
        removed
    }

    fn clear(&mut self) {
        self.children.clear();
        self.parents.clear();
    }
}

impl NodeIndex for MirrorTree {
    fn contains_id(&self, id: &TestId) -> bool {
        self.contains(id)
    }
}

/// Projects [`TreeDiff`]s onto the host surface, never rebuilding it after
/// the initial seed.
/// （將 [`TreeDiff`] 投影到宿主介面；初始播種後不再整棵重建。）
#[derive(Debug, Default)]
pub struct Reconciler {
    mirror: MirrorTree,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mirror(&self) -> &MirrorTree {
        &self.mirror
    }

    /// Seeds the external tree from the entire current model. Used once at
    /// startup; every later change arrives incrementally through [`apply`].
    /// （以目前的完整模型播種外部樹；僅於啟動時使用，之後一律走 [`apply`]
    /// 的增量路徑。）
    ///
    /// [`apply`]: Reconciler::apply
    pub fn seed(&mut self, session: &Session, host: &mut dyn ExplorerHost) {
        self.mirror.clear();
        let mut queue = VecDeque::from([NodeRef::Session(session)]);
        while let Some(node) = queue.pop_front() {
            for child in node.children() {
                self.mirror.insert(node.id(), child.id());
                host.create_node(node.id(), child.id(), child.name(), child.location());
                queue.push_back(child);
            }
        }
    }

    /// Applies one per-batch change record: creations in consumption order,
    /// then in-place updates, then subtree removals. Events whose ids no
    /// longer resolve are dropped, mirroring the stale-patch rule.
    /// （套用一批變動紀錄：先依消化順序建立、再就地更新、最後移除子樹。
    /// 無法解析識別碼的事件比照過期補丁規則直接捨棄。）
    pub fn apply(&mut self, diff: &TreeDiff, session: &Session, host: &mut dyn ExplorerHost) {
        for placement in &diff.added {
            if !self.mirror.contains(&placement.parent) {
                debug!(id = %placement.id, parent = %placement.parent, "dropping add under unknown parent");
                continue;
            }
            // A node created and deleted inside the same batch is absent
            // from the post-apply model and never reaches the host.
            let Some(node) = session.find(&placement.id) else {
                continue;
            };
            self.mirror.insert(&placement.parent, &placement.id);
            host.create_node(&placement.parent, &placement.id, node.name(), node.location());
        }

        for id in &diff.changed {
            if !self.mirror.contains(id) {
                debug!(%id, "dropping update for unmirrored node");
                continue;
            }
            let Some(node) = session.find(id) else {
                continue;
            };
            let fields = NodeFields {
                label: Some(node.name().to_string()),
                location: node.location().map(Path::to_path_buf),
            };
            host.update_node(id, &fields);
        }

        for placement in &diff.removed {
            if self.mirror.remove_subtree(&placement.id).is_empty() {
                debug!(id = %placement.id, "dropping removal of unmirrored node");
                continue;
            }
            host.remove_node(&placement.id);
        }
    }
}
