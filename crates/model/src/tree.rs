use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static SESSION_ID: Lazy<TestId> = Lazy::new(|| TestId("testvista/session".to_string()));

/// Unique identifier assigned to every node of the test hierarchy.
/// 測試階層中每個節點的唯一識別碼。
///
/// The canonical representation is a string; numeric ids seen on the wire
/// are normalised to their decimal form during deserialisation.
/// 標準表示法為字串；線路上出現的數字識別碼會在反序列化時正規化。
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TestId(#[serde(with = "crate::serde_id")] String);

impl TestId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the reserved id addressing the session root in the patch
    /// namespace. The analyzer never issues this id for a regular node.
    /// 取得保留給工作階段根節點的識別碼；分析器不會將它配給一般節點。
    pub fn session() -> &'static TestId {
        &SESSION_ID
    }

    pub fn is_session(&self) -> bool {
        self == &*SESSION_ID
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TestId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TestId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Zero-based line/column position inside a source file.
/// 原始檔內以零為基底的行/欄位置。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineCol {
    pub line: u32,
    pub column: u32,
}

/// Half-open `[start, end)` source span used for navigation.
/// 用於跳轉的半開區間原始碼範圍。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRange {
    pub start: LineCol,
    pub end: LineCol,
}

impl SourceRange {
    pub fn new(start: LineCol, end: LineCol) -> Self {
        Self { start, end }
    }
}

/// Classifies a runnable leaf target.
/// 可執行葉節點的類型分類。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// A `#[test]` function.
    Test,
    /// A `#[bench]` function.
    Bench,
    /// A binary entry point.
    Bin,
}

/// Leaf node: a single test, bench, or binary target.
/// 葉節點，代表單一測試、基準測試或二進位目標。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetNode {
    pub id: TestId,
    pub name: String,
    pub location: PathBuf,
    pub range: SourceRange,
    pub kind: TargetKind,
}

/// Module node holding nested modules and leaf targets.
/// 模組節點，可同時包含子模組與葉目標。
///
/// Both child vectors default to empty when the wire payload omits them;
/// consumers see no difference between an absent and an empty collection.
/// 線路資料省略子集合時一律視為空集合，使用端不區分「未出現」與「空」。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleNode {
    pub id: TestId,
    pub name: String,
    pub location: PathBuf,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modules: Vec<ModuleNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<TargetNode>,
}

/// Crate node directly under the session root.
/// 工作階段根節點之下的 crate 節點。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrateNode {
    pub id: TestId,
    pub name: String,
    pub location: PathBuf,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modules: Vec<ModuleNode>,
}

/// Singleton root of the mirrored test hierarchy. Created once at engine
/// startup and owned by the sync engine; all mutation flows through it.
/// 鏡射測試階層的單一根節點；引擎啟動時建立一次，所有變動皆經由同步引擎。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub crates: Vec<CrateNode>,
}

/// Borrowed view over any node kind, for exhaustive dispatch.
/// 任一節點類型的唯讀借用視圖，供完整的型別分派使用。
#[derive(Debug, Clone, Copy)]
pub enum NodeRef<'a> {
    Session(&'a Session),
    Crate(&'a CrateNode),
    Module(&'a ModuleNode),
    Target(&'a TargetNode),
}

impl<'a> NodeRef<'a> {
    pub fn id(&self) -> &'a TestId {
        match self {
            NodeRef::Session(_) => TestId::session(),
            NodeRef::Crate(krate) => &krate.id,
            NodeRef::Module(module) => &module.id,
            NodeRef::Target(target) => &target.id,
        }
    }

    pub fn name(&self) -> &'a str {
        match self {
            NodeRef::Session(_) => "",
            NodeRef::Crate(krate) => &krate.name,
            NodeRef::Module(module) => &module.name,
            NodeRef::Target(target) => &target.name,
        }
    }

    pub fn location(&self) -> Option<&'a Path> {
        match self {
            NodeRef::Session(_) => None,
            NodeRef::Crate(krate) => Some(&krate.location),
            NodeRef::Module(module) => Some(&module.location),
            NodeRef::Target(target) => Some(&target.location),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            NodeRef::Session(_) => "session",
            NodeRef::Crate(_) => "crate",
            NodeRef::Module(_) => "module",
            NodeRef::Target(_) => "target",
        }
    }

    /// Ordered children: session → crates, crate → modules, module →
    /// modules then targets, target → none.
    /// 依序取得子節點：根節點之下為 crate；模組之下為子模組接著葉目標。
    pub fn children(&self) -> Vec<NodeRef<'a>> {
        match self {
            NodeRef::Session(session) => session.crates.iter().map(NodeRef::Crate).collect(),
            NodeRef::Crate(krate) => krate.modules.iter().map(NodeRef::Module).collect(),
            NodeRef::Module(module) => module
                .modules
                .iter()
                .map(NodeRef::Module)
                .chain(module.targets.iter().map(NodeRef::Target))
                .collect(),
            NodeRef::Target(_) => Vec::new(),
        }
    }

    /// Breadth-first walk of this node and everything below it.
    /// 對此節點與其所有後代做廣度優先走訪。
    pub fn walk(&self) -> Vec<NodeRef<'a>> {
        let mut order = Vec::new();
        let mut queue = std::collections::VecDeque::new();
        queue.push_back(*self);
        while let Some(node) = queue.pop_front() {
            order.push(node);
            queue.extend(node.children());
        }
        order
    }
}

/// Mutable counterpart to [`NodeRef`], handed out to the sync engine only.
/// [`NodeRef`] 的可變版本，僅供同步引擎使用。
#[derive(Debug)]
pub enum NodeMut<'a> {
    Session(&'a mut Session),
    Crate(&'a mut CrateNode),
    Module(&'a mut ModuleNode),
    Target(&'a mut TargetNode),
}

/// A node detached from the tree together with its former parent id.
/// 自樹中移除的節點及其原父節點識別碼。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detached {
    pub parent: TestId,
    pub node: DetachedNode,
}

/// Owned payload of a detached subtree.
/// 移除後持有的子樹內容。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetachedNode {
    Crate(CrateNode),
    Module(ModuleNode),
    Target(TargetNode),
}

impl DetachedNode {
    pub fn id(&self) -> &TestId {
        match self {
            DetachedNode::Crate(krate) => &krate.id,
            DetachedNode::Module(module) => &module.id,
            DetachedNode::Target(target) => &target.id,
        }
    }

    /// Every id contained in the detached subtree, the root included.
    /// 移除子樹內包含的所有識別碼（含子樹根節點本身）。
    pub fn subtree_ids(&self) -> Vec<TestId> {
        let node = match self {
            DetachedNode::Crate(krate) => NodeRef::Crate(krate),
            DetachedNode::Module(module) => NodeRef::Module(module),
            DetachedNode::Target(target) => NodeRef::Target(target),
        };
        node.walk().iter().map(|item| item.id().clone()).collect()
    }
}

/// Tree-manipulation errors.
/// 樹狀結構操作錯誤類型。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("node {0} not found")]
    NodeNotFound(TestId),
    #[error("node {0} cannot hold the appended item kind")]
    InvalidParent(TestId),
}

/// Id-membership lookup shared by the model tree and the explorer mirror.
/// 模型樹與瀏覽鏡像共用的識別碼查詢介面。
pub trait NodeIndex {
    fn contains_id(&self, id: &TestId) -> bool;
}

impl NodeIndex for Session {
    fn contains_id(&self, id: &TestId) -> bool {
        self.find(id).is_some()
    }
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finds a node by identifier; the reserved session id resolves to the
    /// root itself.
    /// 依識別碼尋找節點；保留識別碼會解析為根節點。
    pub fn find(&self, id: &TestId) -> Option<NodeRef<'_>> {
        if id.is_session() {
            return Some(NodeRef::Session(self));
        }
        NodeRef::Session(self)
            .walk()
            .into_iter()
            .find(|node| node.id() == id)
    }

    /// Finds a node for mutation. Reserved for the sync engine.
    /// 取得節點的可變參考，僅供同步引擎呼叫。
    pub fn find_mut(&mut self, id: &TestId) -> Option<NodeMut<'_>> {
        if id.is_session() {
            return Some(NodeMut::Session(self));
        }
        for krate in &mut self.crates {
            if krate.id == *id {
                return Some(NodeMut::Crate(krate));
            }
            for module in &mut krate.modules {
                if let Some(found) = find_in_module_mut(module, id) {
                    return Some(found);
                }
            }
        }
        None
    }

    /// The (parent id, node id) relation of the whole tree, used to compare
    /// shapes against the explorer mirror.
    /// 整棵樹的（父節點、節點）關係集合，用於與瀏覽鏡像比對形狀。
    pub fn shape(&self) -> BTreeSet<(TestId, TestId)> {
        let mut pairs = BTreeSet::new();
        let mut queue = std::collections::VecDeque::new();
        queue.push_back(NodeRef::Session(self));
        while let Some(node) = queue.pop_front() {
            for child in node.children() {
                pairs.insert((node.id().clone(), child.id().clone()));
                queue.push_back(child);
            }
        }
        pairs
    }

    /// Ids reachable under a branch root, the root included. Unknown branch
    /// roots yield an empty list.
    /// 取得分支根節點之下（含其本身）可到達的所有識別碼；未知分支回傳空集合。
    pub fn collect_subtree(&self, id: &TestId) -> Vec<TestId> {
        self.find(id)
            .map(|node| node.walk().iter().map(|item| item.id().clone()).collect())
            .unwrap_or_default()
    }

    /// Appends a crate under the session root. Reserved for the sync engine.
    /// 在根節點下附加 crate 節點，僅供同步引擎呼叫。
    pub fn insert_crate(&mut self, krate: CrateNode) {
        self.crates.push(krate);
    }

    /// Appends a module under a crate or module parent. Reserved for the
    /// sync engine.
    /// 在 crate 或模組父節點下附加模組，僅供同步引擎呼叫。
    pub fn insert_module(&mut self, parent: &TestId, module: ModuleNode) -> Result<(), TreeError> {
        match self.find_mut(parent) {
            Some(NodeMut::Crate(krate)) => {
                krate.modules.push(module);
                Ok(())
            }
            Some(NodeMut::Module(owner)) => {
                owner.modules.push(module);
                Ok(())
            }
            Some(_) => Err(TreeError::InvalidParent(parent.clone())),
            None => Err(TreeError::NodeNotFound(parent.clone())),
        }
    }

    /// Appends a leaf target under a module parent. Reserved for the sync
    /// engine.
    /// 在模組父節點下附加葉目標，僅供同步引擎呼叫。
    pub fn insert_target(&mut self, parent: &TestId, target: TargetNode) -> Result<(), TreeError> {
        match self.find_mut(parent) {
            Some(NodeMut::Module(owner)) => {
                owner.targets.push(target);
                Ok(())
            }
            Some(_) => Err(TreeError::InvalidParent(parent.clone())),
            None => Err(TreeError::NodeNotFound(parent.clone())),
        }
    }

    /// Detaches a node and its whole subtree, reporting the former parent.
    /// The session root itself cannot be removed.
    /// 移除節點與其整個子樹並回報原父節點；根節點本身不可移除。
    pub fn remove(&mut self, id: &TestId) -> Option<Detached> {
        if id.is_session() {
            return None;
        }
        if let Some(index) = self.crates.iter().position(|krate| krate.id == *id) {
            let node = self.crates.remove(index);
            return Some(Detached {
                parent: TestId::session().clone(),
                node: DetachedNode::Crate(node),
            });
        }
        for krate in &mut self.crates {
            if let Some(index) = krate.modules.iter().position(|module| module.id == *id) {
                let node = krate.modules.remove(index);
                return Some(Detached {
                    parent: krate.id.clone(),
                    node: DetachedNode::Module(node),
                });
            }
            for module in &mut krate.modules {
                if let Some(detached) = remove_in_module(module, id) {
                    return Some(detached);
                }
            }
        }
        None
    }
}

fn find_in_module_mut<'a>(module: &'a mut ModuleNode, id: &TestId) -> Option<NodeMut<'a>> {
    if module.id == *id {
        return Some(NodeMut::Module(module));
    }
    for target in &mut module.targets {
        if target.id == *id {
            return Some(NodeMut::Target(target));
        }
    }
    for child in &mut module.modules {
        if let Some(found) = find_in_module_mut(child, id) {
            return Some(found);
        }
    }
    None
}

fn remove_in_module(module: &mut ModuleNode, id: &TestId) -> Option<Detached> {
    if let Some(index) = module.modules.iter().position(|child| child.id == *id) {
        let node = module.modules.remove(index);
        return Some(Detached {
            parent: module.id.clone(),
            node: DetachedNode::Module(node),
        });
    }
    if let Some(index) = module.targets.iter().position(|target| target.id == *id) {
        let node = module.targets.remove(index);
        return Some(Detached {
            parent: module.id.clone(),
            node: DetachedNode::Target(node),
        });
    }
    for child in &mut module.modules {
        if let Some(detached) = remove_in_module(child, id) {
            return Some(detached);
        }
    }
    None
}
