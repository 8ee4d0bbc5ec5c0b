//! Run controller: translates explorer selections into analyzer execute and
//! cancel calls, and fans the remote status stream back onto explorer leaves.
//! （執行控制器：把瀏覽介面的選取轉為分析器的執行/取消呼叫，並將遠端狀態
//! 串流回灌到各葉節點。）

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use testvista_model::{NodeIndex, NodeRef, Session, TestId};
use testvista_protocol::{CancelRequest, RunKind, RunRequest, RunStatusKind, RunStatusUpdate};

/// Failure reported by the analyzer transport.
/// （分析器傳輸層回報的失敗。）
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors surfaced to the caller of the run controller.
/// （執行控制器呼叫端可能收到的錯誤。）
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RunError {
    #[error("selection references unknown branch {0}")]
    SelectionResolution(TestId),
    #[error("a run is already in progress")]
    AlreadyRunning,
    #[error("analyzer transport failure: {0}")]
    Transport(#[from] TransportError),
}

/// Outbound seam towards the remote analyzer. Both calls are
/// fire-and-forget from the caller's perspective; results arrive through
/// the status stream.
/// （對遠端分析器的外送介面；兩個呼叫對呼叫端皆為送出即忘，結果經由狀態
/// 串流回傳。）
pub trait AnalyzerTransport {
    fn run_tests(&self, request: &RunRequest) -> Result<(), TransportError>;
    fn cancel_tests(&self, request: &CancelRequest) -> Result<(), TransportError>;
}

/// Host-side run handle receiving per-leaf transitions and raw output.
/// （宿主端的執行控制代理，接收各葉節點的狀態轉換與原始輸出。）
pub trait RunObserver {
    fn enqueue(&mut self, id: &TestId);
    fn start(&mut self, id: &TestId);
    fn pass(&mut self, id: &TestId, duration: Option<Duration>);
    fn fail(&mut self, id: &TestId, message: Option<&str>, duration: Option<Duration>);
    fn error(&mut self, id: &TestId, message: Option<&str>);
    fn skip(&mut self, id: &TestId);
    fn append_output(&mut self, chunk: &str);
    fn end(&mut self);
}

/// Observable lifecycle of the controller.
/// （控制器可觀察的生命週期狀態。）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
}

/// Last reported state of a selected leaf.
/// （選取葉節點最近一次回報的狀態。）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafState {
    Queued,
    Running,
    Passed,
    Failed,
    Errored,
    Skipped,
}

/// Controller tunables, persisted by the host alongside its own settings.
/// （控制器可調參數，由宿主連同自身設定一併保存。）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerOptions {
    /// Maximum retained transcript chunks; older output is discarded first.
    /// （保留的輸出片段上限，超出時先捨棄最舊者。）
    #[serde(default = "default_transcript_limit")]
    pub transcript_limit: usize,
}

fn default_transcript_limit() -> usize {
    10_000
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            transcript_limit: default_transcript_limit(),
        }
    }
}

impl RunnerOptions {
    pub fn sanitize(&mut self) {
        if self.transcript_limit == 0 {
            self.transcript_limit = default_transcript_limit();
        }
    }
}

/// Per-run state machine: `Idle → Running → per-leaf outcomes → Idle`.
/// Reads the model and the explorer mirror, mutates neither.
/// （每次執行的狀態機：`Idle → Running → 各葉節點結果 → Idle`。僅讀取模型
/// 與瀏覽鏡像，不做任何變更。）
#[derive(Debug, Default)]
pub struct RunController {
    options: RunnerOptions,
    kind: Option<RunKind>,
    leaves: HashMap<TestId, LeafState>,
    transcript: Vec<String>,
    running: bool,
}

impl RunController {
    pub fn new(mut options: RunnerOptions) -> Self {
        options.sanitize();
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn state(&self) -> RunState {
        if self.running {
            RunState::Running
        } else {
            RunState::Idle
        }
    }

    pub fn run_kind(&self) -> Option<RunKind> {
        self.kind
    }

    /// Raw output accumulated for the current or most recent run.
    /// （目前或最近一次執行累積的原始輸出。）
    pub fn transcript(&self) -> &[String] {
        &self.transcript
    }

    /// Last reported per-leaf states, retained after the run finishes so a
    /// host can re-render without replaying the stream.
    /// （各葉節點最近回報的狀態；執行結束後仍保留，宿主重繪時不需重播串流。）
    pub fn leaf_states(&self) -> &HashMap<TestId, LeafState> {
        &self.leaves
    }

    /// Resolves the selection against the tree, enqueues every selected
    /// leaf on the observer, and issues the branch-root `runTests` call.
    /// （依樹解析選取範圍、將選到的葉節點逐一排入觀察者，並以分支根節點
    /// 送出 `runTests`。）
    pub fn execute(
        &mut self,
        include: Option<&[TestId]>,
        exclude: Option<&[TestId]>,
        kind: RunKind,
        session: &Session,
        transport: &dyn AnalyzerTransport,
        observer: &mut dyn RunObserver,
    ) -> Result<(), RunError> {
        if self.running {
            return Err(RunError::AlreadyRunning);
        }

        let selected = select_leaves(session, include, exclude)?;
        let request = RunRequest {
            include: include.map(<[TestId]>::to_vec),
            exclude: exclude.map(<[TestId]>::to_vec),
            run_kind: kind,
        };
        transport.run_tests(&request)?;

        self.kind = Some(kind);
        self.leaves.clear();
        self.transcript.clear();
        for id in &selected {
            observer.enqueue(id);
            self.leaves.insert(id.clone(), LeafState::Queued);
        }
        self.running = true;
        Ok(())
    }

    /// Requests cancellation of the given ids. Cooperative: the run still
    /// terminates through the remote `Finish` signal, and a failed cancel
    /// is not retried.
    /// （要求取消指定識別碼。屬協作式取消：執行仍以遠端 `Finish` 結束，
    /// 取消失敗不會重試。）
    pub fn cancel(
        &self,
        exact: &[TestId],
        transport: &dyn AnalyzerTransport,
    ) -> Result<(), RunError> {
        let request = CancelRequest {
            exact: exact.to_vec(),
        };
        transport.cancel_tests(&request)?;
        Ok(())
    }

    /// Fans one status batch onto the observer. Ids that do not resolve in
    /// the explorer index are dropped, as are leaf transitions outside an
    /// active run.
    /// （將一批狀態事件回灌給觀察者；無法在瀏覽索引解析的識別碼，以及非
    /// 執行期間的葉節點轉換，一律捨棄。）
    pub fn handle_status(
        &mut self,
        updates: &[RunStatusUpdate],
        index: &dyn NodeIndex,
        observer: &mut dyn RunObserver,
    ) {
        for update in updates {
            match update.kind {
                RunStatusKind::RawOutput => {
                    let Some(message) = &update.message else {
                        continue;
                    };
                    if self.running {
                        if self.transcript.len() == self.options.transcript_limit {
                            self.transcript.remove(0);
                        }
                        self.transcript.push(message.clone());
                    }
                    observer.append_output(message);
                }
                RunStatusKind::Finish => {
                    self.running = false;
                    observer.end();
                }
                kind => {
                    let Some(id) = &update.id else {
                        debug!(?kind, "dropping status update without id");
                        continue;
                    };
                    if !self.running {
                        debug!(%id, ?kind, "dropping status update outside a run");
                        continue;
                    }
                    if !index.contains_id(id) {
                        debug!(%id, ?kind, "dropping status update for unresolvable id");
                        continue;
                    }
                    let duration = update.duration.map(Duration::from_millis);
                    let message = update.message.as_deref();
                    match kind {
                        RunStatusKind::Started => {
                            self.leaves.insert(id.clone(), LeafState::Running);
                            observer.start(id);
                        }
                        RunStatusKind::Passed => {
                            self.leaves.insert(id.clone(), LeafState::Passed);
                            observer.pass(id, duration);
                        }
                        RunStatusKind::Failed => {
                            self.leaves.insert(id.clone(), LeafState::Failed);
                            observer.fail(id, message, duration);
                        }
                        RunStatusKind::Errored => {
                            self.leaves.insert(id.clone(), LeafState::Errored);
                            observer.error(id, message);
                        }
                        RunStatusKind::Skipped => {
                            self.leaves.insert(id.clone(), LeafState::Skipped);
                            observer.skip(id);
                        }
                        RunStatusKind::RawOutput | RunStatusKind::Finish => {}
                    }
                }
            }
        }
    }
}

/// Set difference over subtrees: every leaf target reachable under the
/// include roots (the whole tree when `None`), minus every leaf reachable
/// under the exclude roots. Unknown branch ids fail the selection.
/// （子樹集合差：include 根節點（`None` 代表整棵樹）下可達的葉目標，扣除
/// exclude 根節點下可達者；未知的分支識別碼使選取失敗。）
fn select_leaves(
    session: &Session,
    include: Option<&[TestId]>,
    exclude: Option<&[TestId]>,
) -> Result<Vec<TestId>, RunError> {
    let mut excluded: HashSet<TestId> = HashSet::new();
    if let Some(ids) = exclude {
        for id in ids {
            let subtree = session.collect_subtree(id);
            if subtree.is_empty() {
                return Err(RunError::SelectionResolution(id.clone()));
            }
            excluded.extend(subtree);
        }
    }

    let roots: Vec<TestId> = match include {
        Some(ids) => ids.to_vec(),
        None => vec![TestId::session().clone()],
    };

    let mut seen: HashSet<TestId> = HashSet::new();
    let mut selected = Vec::new();
    for root in &roots {
        let node = session
            .find(root)
            .ok_or_else(|| RunError::SelectionResolution(root.clone()))?;
        for item in node.walk() {
            if let NodeRef::Target(target) = item {
                if !excluded.contains(&target.id) && seen.insert(target.id.clone()) {
                    selected.push(target.id.clone());
                }
            }
        }
    }
    Ok(selected)
}
