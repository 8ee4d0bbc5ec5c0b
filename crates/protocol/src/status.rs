use serde::{Deserialize, Serialize};

use testvista_model::TestId;

use crate::ProtocolError;

/// Discriminates entries of the remote run-status stream.
/// 區分遠端執行狀態串流中的各種事件。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatusKind {
    RawOutput,
    Started,
    Passed,
    Failed,
    Errored,
    Skipped,
    Finish,
}

/// One entry of the `runStatus` notification stream. All kinds except
/// `RawOutput` and `Finish` carry the id of the leaf they concern.
/// `runStatus` 通知串流的單筆內容；除 `RawOutput` 與 `Finish` 外皆帶葉節點
/// 識別碼。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatusUpdate {
    pub kind: RunStatusKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<TestId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Wall-clock duration in milliseconds, when the remote reports one.
    /// 遠端回報的耗時（毫秒）。
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
}

impl RunStatusUpdate {
    /// Decodes one `runStatus` notification payload (an array of entries).
    /// 解碼一筆 `runStatus` 通知內容（事件陣列）。
    pub fn batch_from_json(payload: &str) -> Result<Vec<Self>, ProtocolError> {
        serde_json::from_str(payload).map_err(|source| ProtocolError::Decode {
            what: "run status batch",
            source,
        })
    }
}

/// Whether a run executes plainly or under a debugger.
/// 執行模式：一般執行或除錯模式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunKind {
    Run,
    Debug,
}

/// Outbound `runTests` payload. Selections are expressed by branch roots so
/// the remote side need not receive every leaf id; `include: None` means
/// the whole tree.
/// 對外 `runTests` 載荷。選取範圍以分支根節點表示，遠端不需收到所有葉節點
/// 識別碼；`include: None` 代表整棵樹。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<Vec<TestId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude: Option<Vec<TestId>>,
    pub run_kind: RunKind,
}

/// Outbound `cancelTests` payload: the exact ids to cancel.
/// 對外 `cancelTests` 載荷：欲取消的精確識別碼清單。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub exact: Vec<TestId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_status_batch() {
        let batch = RunStatusUpdate::batch_from_json(
            r#"[
                {"kind": "Started", "id": "t1"},
                {"kind": "RawOutput", "message": "running 3 tests\n"},
                {"kind": "Passed", "id": "t1", "duration": 12},
                {"kind": "Finish"}
            ]"#,
        )
        .unwrap();
        assert_eq!(batch.len(), 4);
        assert_eq!(batch[0].kind, RunStatusKind::Started);
        assert_eq!(batch[1].message.as_deref(), Some("running 3 tests\n"));
        assert_eq!(batch[2].duration, Some(12));
        assert!(batch[3].id.is_none());
    }

    #[test]
    fn run_request_serializes_branch_roots_camel_cased() {
        let request = RunRequest {
            include: Some(vec![TestId::new("m1")]),
            exclude: None,
            run_kind: RunKind::Debug,
        };
        let encoded = serde_json::to_value(&request).unwrap();
        assert_eq!(encoded["include"][0], "m1");
        assert_eq!(encoded["runKind"], "Debug");
        assert!(encoded.get("exclude").is_none());
    }

    #[test]
    fn malformed_status_surfaces_a_decode_error() {
        let err = RunStatusUpdate::batch_from_json("{}").unwrap_err();
        assert!(err.to_string().contains("run status batch"));
    }
}
