use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use testvista_model::{CrateNode, ModuleNode, TargetKind, TargetNode, TestId};

use crate::ProtocolError;

/// One batch of incremental changes bringing the local tree back in sync
/// with the analyzer.
/// 一批增量更新，讓本地樹與分析器重新同步。
///
/// The three groups are independent lists, not an ordered operation log.
/// `delete` and `update` entries may be applied in any order; `append`
/// entries are positionally significant and must be consumed in list order,
/// because a later entry may target a node created by an earlier one.
/// 三個群組是彼此獨立的清單而非有序操作記錄。`delete` 與 `update` 可以任意
/// 順序套用；`append` 具位置意義，必須依清單順序消化，因為較後的項目可能
/// 指向同批較早項目剛建立的節點。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaUpdate {
    #[serde(default)]
    pub id: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub delete: Vec<DeletePatch>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub update: Vec<UpdatePatch>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub append: Vec<AppendPatch>,
}

impl DeltaUpdate {
    pub fn is_empty(&self) -> bool {
        self.delete.is_empty() && self.update.is_empty() && self.append.is_empty()
    }

    /// Decodes one `dataUpdate` notification payload.
    /// 解碼一筆 `dataUpdate` 通知內容。
    pub fn from_json(payload: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(payload).map_err(|source| ProtocolError::Decode {
            what: "delta update",
            source,
        })
    }
}

/// Removes the target node and, transitively, its entire subtree.
/// 刪除目標節點並連帶移除其整個子樹。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletePatch {
    pub target_id: TestId,
}

/// Overwrites the present payload fields of the target node.
/// 以載荷中出現的欄位覆寫目標節點。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePatch {
    pub target_id: TestId,
    #[serde(default)]
    pub payload: UpdatePayload,
}

/// Partial record of node attributes. Absent fields are left unchanged;
/// fields not meaningful for the target's kind are per-field no-ops.
/// 節點屬性的部分紀錄。未出現的欄位維持原值；與目標類型無關的欄位個別忽略。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_kind: Option<TargetKind>,
}

impl UpdatePayload {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.location.is_none() && self.test_kind.is_none()
    }
}

/// Inserts a full new node under the target parent.
/// 在目標父節點下插入一個完整的新節點。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendPatch {
    pub target_id: TestId,
    pub item: AppendItem,
}

/// Payload of an append: a crate under the session, a module under a crate
/// or module, or a leaf target under a module. Any other pairing is a
/// protocol violation.
/// 附加載荷：根節點下為 crate、crate 或模組下為模組、模組下為葉目標；其他
/// 組合皆屬協定違規。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "nodeKind", rename_all = "lowercase")]
pub enum AppendItem {
    Crate(CrateNode),
    Module(ModuleNode),
    Target(TargetNode),
}

impl AppendItem {
    pub fn id(&self) -> &TestId {
        match self {
            AppendItem::Crate(krate) => &krate.id,
            AppendItem::Module(module) => &module.id,
            AppendItem::Target(target) => &target.id,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            AppendItem::Crate(_) => "crate",
            AppendItem::Module(_) => "module",
            AppendItem::Target(_) => "target",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_mixed_batch() {
        let delta = DeltaUpdate::from_json(
            r#"{
                "id": 7,
                "delete": [{"targetId": "m9"}],
                "update": [{"targetId": 41, "payload": {"name": "renamed"}}],
                "append": [{
                    "targetId": "m1",
                    "item": {
                        "nodeKind": "target",
                        "id": "t5",
                        "name": "parses_empty_input",
                        "location": "src/parser.rs",
                        "range": {"start": {"line": 10, "column": 0}, "end": {"line": 14, "column": 1}},
                        "kind": "test"
                    }
                }]
            }"#,
        )
        .unwrap();

        assert_eq!(delta.id, 7);
        assert_eq!(delta.delete[0].target_id, TestId::new("m9"));
        // Numeric wire ids normalize to their decimal string form.
        assert_eq!(delta.update[0].target_id, TestId::new("41"));
        assert_eq!(delta.update[0].payload.name.as_deref(), Some("renamed"));
        assert!(delta.update[0].payload.location.is_none());
        let item = &delta.append[0].item;
        assert_eq!(item.kind_name(), "target");
        assert_eq!(item.id(), &TestId::new("t5"));
        match item {
            AppendItem::Target(target) => {
                assert_eq!(target.kind, TargetKind::Test);
                assert_eq!(target.range.end.line, 14);
            }
            other => panic!("expected a target item, got {other:?}"),
        }
    }

    #[test]
    fn missing_groups_default_to_empty() {
        let delta = DeltaUpdate::from_json(r#"{"id": 1}"#).unwrap();
        assert!(delta.is_empty());
        assert_eq!(delta.id, 1);
    }

    #[test]
    fn malformed_payload_surfaces_a_decode_error() {
        let err = DeltaUpdate::from_json("{\"append\": 3}").unwrap_err();
        assert!(err.to_string().contains("delta update"));
    }

    #[test]
    fn append_item_round_trips_module_with_children() {
        let json = r#"{
            "nodeKind": "module",
            "id": "m3",
            "name": "io_tests",
            "location": "src/io.rs",
            "targets": [{
                "id": "t1",
                "name": "reads",
                "location": "src/io.rs",
                "range": {"start": {"line": 1, "column": 0}, "end": {"line": 3, "column": 1}},
                "kind": "bench"
            }]
        }"#;
        let item: AppendItem = serde_json::from_str(json).unwrap();
        match &item {
            AppendItem::Module(module) => {
                assert!(module.modules.is_empty());
                assert_eq!(module.targets.len(), 1);
                assert_eq!(module.targets[0].kind, TargetKind::Bench);
            }
            other => panic!("expected a module item, got {other:?}"),
        }
        let encoded = serde_json::to_value(&item).unwrap();
        assert_eq!(encoded["nodeKind"], "module");
        assert!(encoded.get("modules").is_none());
    }
}
