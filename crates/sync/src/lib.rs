//! Delta-synchronization engine: applies analyzer patch batches to the
//! local test hierarchy.
//! 增量同步引擎：將分析器的補丁批次套用到本地測試階層。

mod engine;

pub use engine::{SyncEngine, SyncError};
