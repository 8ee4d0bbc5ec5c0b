use std::collections::{HashSet, VecDeque};

use thiserror::Error;
use tracing::{debug, warn};

use testvista_model::{NodeMut, Placement, Session, TestId, TreeDiff, TreeError};
use testvista_protocol::{AppendItem, AppendPatch, DeltaUpdate, UpdatePayload};

/// Fatal failures while applying a delta batch. The tree is left in the
/// partial state reached so far; the analyzer re-converges it with
/// subsequent batches.
/// 套用增量批次時的致命錯誤。樹會停留在已套用的部分狀態，由分析器以後續
/// 批次重新收斂。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("cannot append {item_kind} item under {target_kind} node {target}")]
    ProtocolViolation {
        target: TestId,
        target_kind: &'static str,
        item_kind: &'static str,
    },
    #[error("append targets unknown or unreachable node {target}")]
    UnresolvedAppend { target: TestId },
}

/// Sole owner and mutator of the session tree. Applies one [`DeltaUpdate`]
/// at a time and reports the resulting per-node changes as a [`TreeDiff`].
/// 工作階段樹的唯一擁有者與變更者；逐批套用 [`DeltaUpdate`] 並以
/// [`TreeDiff`] 回報各節點的變動。
#[derive(Debug, Default)]
pub struct SyncEngine {
    session: Session,
}

impl SyncEngine {
    pub fn new(session: Session) -> Self {
        Self { session }
    }

    /// Read access for the reconciler and the run controller.
    /// 供調和器與執行控制器唯讀存取。
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn into_session(self) -> Session {
        self.session
    }

    /// Applies one delta batch with a single breadth-first traversal,
    /// parent before children, starting with a virtual visit of the root.
    /// 以單趟廣度優先走訪（父節點先於子節點，先虛擬走訪根節點）套用一批
    /// 增量更新。
    ///
    /// Per visited node: consume at most one matching update, then at most
    /// one matching delete (which detaches the whole subtree and evicts its
    /// queued children), then the leading run of appends targeting the node.
    /// Append consumption descends immediately into each freshly created
    /// child, so a later entry may target a node created earlier in the
    /// same batch.
    /// 每個節點依序消化：至多一筆更新、至多一筆刪除（連同子樹一併移除並自
    /// 佇列剔除其子節點）、以及以該節點為目標的開頭附加序列。附加消化會立
    /// 即深入剛建立的子節點，因此較後的附加可指向同批稍早建立者。
    pub fn apply(&mut self, delta: DeltaUpdate) -> Result<TreeDiff, SyncError> {
        let DeltaUpdate {
            id: batch,
            mut delete,
            mut update,
            append,
        } = delta;
        let mut appends: VecDeque<AppendPatch> = append.into();
        let mut removed: HashSet<TestId> = HashSet::new();
        let mut diff = TreeDiff::default();

        // Virtual root visit: the session consumes no update/delete, only
        // appends of crates.
        self.drain_appends(TestId::session(), &mut appends, &removed, &mut diff)?;

        let mut queue: VecDeque<TestId> = self
            .session
            .crates
            .iter()
            .map(|krate| krate.id.clone())
            .collect();

        while let Some(id) = queue.pop_front() {
            if removed.contains(&id) {
                continue;
            }

            if let Some(index) = update.iter().position(|patch| patch.target_id == id) {
                let patch = update.remove(index);
                self.apply_update(&id, patch.payload);
                diff.changed.push(id.clone());
            }

            if let Some(index) = delete.iter().position(|patch| patch.target_id == id) {
                delete.remove(index);
                if let Some(detached) = self.session.remove(&id) {
                    removed.extend(detached.node.subtree_ids());
                    diff.removed.push(Placement::new(detached.parent, id.clone()));
                }
                // The subtree is gone; nothing below it is visited.
                continue;
            }

            self.drain_appends(&id, &mut appends, &removed, &mut diff)?;

            if let Some(node) = self.session.find(&id) {
                for child in node.children() {
                    queue.push_back(child.id().clone());
                }
            }
        }

        // Leftover deletes/updates reference ids the analyzer already took
        // away, or ids this batch removed before reaching them. Both are
        // stale, not errors.
        for patch in &delete {
            debug!(batch, target = %patch.target_id, "dropping stale delete patch");
        }
        for patch in &update {
            debug!(batch, target = %patch.target_id, "dropping stale update patch");
        }
        for patch in &appends {
            if removed.contains(&patch.target_id) {
                debug!(batch, target = %patch.target_id, "dropping append into deleted subtree");
            } else {
                warn!(batch, target = %patch.target_id, "aborting batch: unconsumed append");
                return Err(SyncError::UnresolvedAppend {
                    target: patch.target_id.clone(),
                });
            }
        }

        Ok(diff)
    }

    /// Merges present payload fields into the node. Fields the node's kind
    /// does not carry are ignored per field.
    /// 將載荷中出現的欄位合併進節點；該節點類型沒有的欄位個別忽略。
    fn apply_update(&mut self, id: &TestId, payload: UpdatePayload) {
        match self.session.find_mut(id) {
            Some(NodeMut::Crate(krate)) => {
                if let Some(name) = payload.name {
                    krate.name = name;
                }
                if let Some(location) = payload.location {
                    krate.location = location;
                }
            }
            Some(NodeMut::Module(module)) => {
                if let Some(name) = payload.name {
                    module.name = name;
                }
                if let Some(location) = payload.location {
                    module.location = location;
                }
            }
            Some(NodeMut::Target(target)) => {
                if let Some(name) = payload.name {
                    target.name = name;
                }
                if let Some(location) = payload.location {
                    target.location = location;
                }
                if let Some(kind) = payload.test_kind {
                    target.kind = kind;
                }
            }
            Some(NodeMut::Session(_)) | None => {}
        }
    }

    /// Consumes the leading appends targeting `target`, descending into each
    /// freshly created child before returning to the current head.
    /// 消化以 `target` 為目標的開頭附加項目，並於每個新節點建立後立即深入
    /// 處理其後續附加。
    fn drain_appends(
        &mut self,
        target: &TestId,
        appends: &mut VecDeque<AppendPatch>,
        removed: &HashSet<TestId>,
        diff: &mut TreeDiff,
    ) -> Result<(), SyncError> {
        loop {
            // Stale heads (appends into a subtree this batch already
            // removed) would otherwise block every entry behind them.
            while appends
                .front()
                .is_some_and(|head| removed.contains(&head.target_id))
            {
                if let Some(stale) = appends.pop_front() {
                    debug!(target = %stale.target_id, "dropping append into deleted subtree");
                }
            }

            let head_matches = appends
                .front()
                .is_some_and(|head| head.target_id == *target);
            if !head_matches {
                return Ok(());
            }
            let Some(patch) = appends.pop_front() else {
                return Ok(());
            };

            let child_id = self.insert_item(target, patch.item)?;
            diff.added.push(Placement::new(target.clone(), child_id.clone()));
            self.drain_appends(&child_id, appends, removed, diff)?;
        }
    }

    /// Creates one node under `parent`, rejecting kind pairings the tree
    /// cannot legally hold.
    /// 在 `parent` 下建立一個節點；不合法的型別組合會被拒絕。
    fn insert_item(&mut self, parent: &TestId, item: AppendItem) -> Result<TestId, SyncError> {
        let parent_kind = match self.session.find(parent) {
            Some(node) => node.kind_name(),
            None => {
                return Err(SyncError::UnresolvedAppend {
                    target: parent.clone(),
                })
            }
        };
        let item_kind = item.kind_name();
        let violation = || SyncError::ProtocolViolation {
            target: parent.clone(),
            target_kind: parent_kind,
            item_kind,
        };

        let child_id = item.id().clone();
        match item {
            AppendItem::Crate(krate) => {
                if !parent.is_session() {
                    return Err(violation());
                }
                self.session.insert_crate(krate);
            }
            AppendItem::Module(module) => {
                if parent.is_session() {
                    return Err(violation());
                }
                self.session
                    .insert_module(parent, module)
                    .map_err(|err| match err {
                        TreeError::InvalidParent(_) => violation(),
                        TreeError::NodeNotFound(id) => SyncError::UnresolvedAppend { target: id },
                    })?;
            }
            AppendItem::Target(target) => {
                if parent.is_session() {
                    return Err(violation());
                }
                self.session
                    .insert_target(parent, target)
                    .map_err(|err| match err {
                        TreeError::InvalidParent(_) => violation(),
                        TreeError::NodeNotFound(id) => SyncError::UnresolvedAppend { target: id },
                    })?;
            }
        }
        Ok(child_id)
    }
}
