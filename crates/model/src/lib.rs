//! Test-hierarchy model primitives for TestVista.
//! TestVista 測試階層的核心資料模型模組。

pub mod diff;
mod serde_id;
pub mod tree;

pub use diff::{Placement, TreeDiff};
pub use tree::{
    CrateNode, Detached, DetachedNode, LineCol, ModuleNode, NodeIndex, NodeMut, NodeRef, Session,
    SourceRange, TargetKind, TargetNode, TestId, TreeError,
};
