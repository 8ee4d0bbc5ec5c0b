use crate::tree::TestId;

/// Records where a node sits relative to its parent.
/// 紀錄節點與父節點的相對位置。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub parent: TestId,
    pub id: TestId,
}

impl Placement {
    pub fn new(parent: TestId, id: TestId) -> Self {
        Self { parent, id }
    }
}

/// Captures the per-node changes produced by applying one delta batch.
/// 套用一批增量更新後，各節點變動的紀錄。
///
/// `added` preserves append consumption order, so parents always precede
/// their descendants; `removed` lists deleted subtree roots only.
/// `added` 依附加消化順序排列，父節點必在其後代之前；`removed` 僅列出被刪除
/// 子樹的根節點。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeDiff {
    pub added: Vec<Placement>,
    pub changed: Vec<TestId>,
    pub removed: Vec<Placement>,
}

impl TreeDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_diff_reports_empty() {
        assert!(TreeDiff::default().is_empty());
        let diff = TreeDiff {
            changed: vec![TestId::new("n1")],
            ..TreeDiff::default()
        };
        assert!(!diff.is_empty());
    }
}
