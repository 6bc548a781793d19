//! 已知检查集合

use pacs_core::{StudyIdentifier, StudySummary};
use std::collections::HashSet;

/// 已处理过的检查标识集合，保留插入顺序
#[derive(Debug, Clone, Default)]
pub struct KnownSet {
    members: HashSet<StudyIdentifier>,
    order: Vec<StudyIdentifier>,
}

impl KnownSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 由一次完整的归档查询结果建立基线，跳过空标识
    pub fn from_studies(studies: &[StudySummary]) -> Self {
        let mut known = Self::new();
        for study in studies.iter().filter(|s| s.is_trackable()) {
            known.insert(&study.study_instance_uid);
        }
        known
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.contains(id)
    }

    /// 插入标识，返回是否为新成员
    pub fn insert(&mut self, id: &str) -> bool {
        if id.is_empty() || self.members.contains(id) {
            return false;
        }
        self.members.insert(id.to_string());
        self.order.push(id.to_string());
        true
    }

    /// 吸收一次查询结果，按原顺序返回新发现的检查
    ///
    /// 新检查的标识在返回前即已插入集合。
    pub fn absorb(&mut self, studies: Vec<StudySummary>) -> Vec<StudySummary> {
        studies
            .into_iter()
            .filter(|study| study.is_trackable() && self.insert(&study.study_instance_uid))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn clear(&mut self) {
        self.members.clear();
        self.order.clear();
    }

    /// 按插入顺序返回所有标识的快照
    pub fn identifiers(&self) -> Vec<StudyIdentifier> {
        self.order.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn studies(ids: &[&str]) -> Vec<StudySummary> {
        ids.iter().map(|id| StudySummary::new(*id)).collect()
    }

    #[test]
    fn test_baseline_skips_empty_identifiers() {
        let known = KnownSet::from_studies(&studies(&["A", "", "B"]));
        assert_eq!(known.len(), 2);
        assert!(!known.contains(""));
    }

    #[test]
    fn test_absorb_returns_new_in_order() {
        let mut known = KnownSet::from_studies(&studies(&["A"]));
        let fresh = known.absorb(studies(&["C", "A", "B"]));

        let ids: Vec<_> = fresh.iter().map(|s| s.study_instance_uid.as_str()).collect();
        assert_eq!(ids, vec!["C", "B"]);
        assert_eq!(known.identifiers(), vec!["A", "C", "B"]);
    }

    #[test]
    fn test_absorb_deduplicates_within_one_batch() {
        let mut known = KnownSet::new();
        let fresh = known.absorb(studies(&["A", "A", ""]));

        assert_eq!(fresh.len(), 1);
        assert_eq!(known.len(), 1);
    }

    #[test]
    fn test_clear() {
        let mut known = KnownSet::from_studies(&studies(&["A", "B"]));
        known.clear();

        assert!(known.is_empty());
        assert!(known.insert("A"));
    }
}
