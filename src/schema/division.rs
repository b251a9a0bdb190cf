//! Administrative divisions (province / city / district), looked up by name.

use std::collections::HashMap;

use crate::model::{RelationEdge, RelationKind};

/// Municipalities whose division rows are stored without the trailing 市.
const MUNICIPALITIES: &[&str] = &["北京市", "上海市", "重庆市", "天津市"];

/// One row of the division table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DivisionNode {
    pub name: String,
    pub id: i64,
    pub level: i64,
    pub parent_id: Option<i64>,
}

impl DivisionNode {
    pub fn to_edge(&self) -> RelationEdge {
        RelationEdge::new(RelationKind::Division, self.name.clone(), self.id)
    }
}

#[derive(Debug, Default)]
pub struct DivisionIndex {
    by_name: HashMap<String, DivisionNode>,
}

impl DivisionIndex {
    /// Later rows with a duplicate name replace earlier ones.
    pub fn build(rows: impl IntoIterator<Item = DivisionNode>) -> Self {
        let by_name: HashMap<_, _> = rows.into_iter().map(|row| (row.name.clone(), row)).collect();
        log::info!("Division index loaded: {} names", by_name.len());
        Self { by_name }
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn lookup(&self, name: &str) -> Option<&DivisionNode> {
        let name = name.trim();
        if MUNICIPALITIES.contains(&name) {
            let short = name.trim_end_matches('市');
            if let Some(node) = self.by_name.get(short) {
                return Some(node);
            }
        }
        self.by_name.get(name)
    }

    /// Up to three division edges for an address; unknown parts are skipped.
    pub fn edges_for(&self, province: Option<&str>, city: Option<&str>, area: Option<&str>) -> Vec<RelationEdge> {
        let mut edges: Vec<RelationEdge> = Vec::new();
        for node in [province, city, area].into_iter().flatten().filter_map(|name| self.lookup(name)) {
            let edge = node.to_edge();
            // A municipality is both province and city
            if !edges.iter().any(|e| e.object_id == edge.object_id) {
                edges.push(edge);
            }
        }
        edges
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ObjectId;

    fn index() -> DivisionIndex {
        DivisionIndex::build(vec![
            DivisionNode { name: "北京".into(), id: 110000, level: 1, parent_id: None },
            DivisionNode { name: "海淀区".into(), id: 110108, level: 3, parent_id: Some(110000) },
            DivisionNode { name: "广东省".into(), id: 440000, level: 1, parent_id: None },
            DivisionNode { name: "深圳市".into(), id: 440300, level: 2, parent_id: Some(440000) },
            DivisionNode { name: "南山区".into(), id: 440305, level: 3, parent_id: Some(440300) },
        ])
    }

    #[test]
    fn test_municipality_suffix_normalized() {
        let index = index();
        let long = index.lookup("北京市").unwrap();
        let short = index.lookup("北京").unwrap();
        assert_eq!(long, short);
        assert_eq!(long.id, 110000);
    }

    #[test]
    fn test_municipality_falls_back_to_verbatim() {
        let index = DivisionIndex::build(vec![DivisionNode {
            name: "上海市".into(),
            id: 310000,
            level: 1,
            parent_id: None,
        }]);
        assert_eq!(index.lookup("上海市").unwrap().id, 310000);
    }

    #[test]
    fn test_ordinary_city_suffix_kept() {
        let index = index();
        assert_eq!(index.lookup("深圳市").unwrap().id, 440300);
        assert!(index.lookup("深圳").is_none());
    }

    #[test]
    fn test_unknown_name_is_none() {
        assert!(index().lookup("火星市").is_none());
    }

    #[test]
    fn test_edges_for_address() {
        let edges = index().edges_for(Some("广东省"), Some("深圳市"), Some("南山区"));
        let ids: Vec<_> = edges.iter().map(|e| e.object_id.clone()).collect();
        assert_eq!(ids, vec![ObjectId::Int(440000), ObjectId::Int(440300), ObjectId::Int(440305)]);
        assert!(edges.iter().all(|e| e.relation_type == RelationKind::Division));
    }

    #[test]
    fn test_edges_for_municipality_not_duplicated() {
        let edges = index().edges_for(Some("北京市"), Some("北京市"), Some("海淀区"));
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].object_name, "北京");
    }

    #[test]
    fn test_edges_skip_unknown_and_missing() {
        let edges = index().edges_for(None, Some("火星市"), Some("南山区"));
        assert_eq!(edges.len(), 1);
    }
}
