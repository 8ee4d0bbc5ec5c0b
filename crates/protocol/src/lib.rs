//! Wire types for the analyzer notification and control channel.
//! 分析器通知與控制通道的線路資料型別。

use thiserror::Error;

mod delta;
mod status;

pub use delta::{AppendItem, AppendPatch, DeletePatch, DeltaUpdate, UpdatePatch, UpdatePayload};
pub use status::{CancelRequest, RunKind, RunRequest, RunStatusKind, RunStatusUpdate};

/// Errors raised while decoding notification payloads.
/// 解碼通知資料時可能發生的錯誤。
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid {what} payload: {source}")]
    Decode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
}
