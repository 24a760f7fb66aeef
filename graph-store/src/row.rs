use crate::location::CodeLocation;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A node that appeared in a result row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNodeRef {
    pub element_id: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

/// A relationship that appeared in a result row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphRelationshipRef {
    pub element_id: String,
    pub rel_type: String,
    #[serde(default)]
    pub start_node: Option<String>,
    #[serde(default)]
    pub end_node: Option<String>,
}

/// One result row: named columns plus the graph elements it touched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphRow {
    pub columns: Map<String, Value>,
    #[serde(default)]
    pub nodes: Vec<GraphNodeRef>,
    #[serde(default)]
    pub relationships: Vec<GraphRelationshipRef>,
}

impl GraphRow {
    pub fn from_columns(columns: Map<String, Value>) -> Self {
        Self {
            columns,
            ..Default::default()
        }
    }

    pub fn with_node(mut self, node: GraphNodeRef) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_relationship(mut self, relationship: GraphRelationshipRef) -> Self {
        self.relationships.push(relationship);
        self
    }

    /// First code location found in the row.
    pub fn code_location(&self) -> Option<CodeLocation> {
        self.code_locations().into_iter().next()
    }

    /// Every distinct code location in the row, in discovery order.
    ///
    /// Checks string columns (`c.code`) and map-valued columns (returned
    /// nodes), then the row's own columns as properties, then node properties.
    pub fn code_locations(&self) -> Vec<CodeLocation> {
        let from_values = self.columns.values().filter_map(|value| match value {
            Value::String(s) => CodeLocation::decode(s),
            Value::Object(props) => CodeLocation::from_properties(props),
            _ => None,
        });
        let from_columns = CodeLocation::from_properties(&self.columns);
        let from_nodes = self
            .nodes
            .iter()
            .filter_map(|n| CodeLocation::from_properties(&n.properties));

        let mut found: Vec<CodeLocation> = Vec::new();
        for location in from_values.chain(from_columns).chain(from_nodes) {
            if !found.contains(&location) {
                found.push(location);
            }
        }
        found
    }

    /// Element ids of the row's nodes, without duplicates.
    pub fn node_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = Vec::new();
        for node in &self.nodes {
            if !ids.contains(&node.element_id.as_str()) {
                ids.push(&node.element_id);
            }
        }
        ids
    }

    /// Node labels, in row order, without duplicates.
    pub fn labels(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = Vec::new();
        for label in self.nodes.iter().flat_map(|n| n.labels.iter()) {
            if !labels.contains(&label.as_str()) {
                labels.push(label);
            }
        }
        labels
    }

    /// String value of the column `name`, or of the first `<var>.name` column.
    pub fn text_column(&self, name: &str) -> Option<&str> {
        if let Some(v) = self.columns.get(name).and_then(Value::as_str) {
            return Some(v);
        }
        let dotted = format!(".{name}");
        self.columns
            .iter()
            .find(|(key, _)| key.ends_with(&dotted))
            .and_then(|(_, v)| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn columns(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_location_from_encoded_column() {
        let row = GraphRow::from_columns(columns(json!({
            "c.name": "User",
            "c.code": "<CODE>{\"S\":3,\"E\":9,\"F\":\"app/user.py\"}</CODE>"
        })));
        let loc = row.code_location().unwrap();
        assert_eq!(loc.path, "app/user.py");
        assert_eq!((loc.start_line, loc.end_line), (3, 9));
    }

    #[test]
    fn test_location_from_node_map_column() {
        let row = GraphRow::from_columns(columns(json!({
            "c": {"name": "User", "file_path": "app/user.py", "start_line": 1, "end_line": 4}
        })));
        assert_eq!(row.code_location().unwrap().end_line, 4);
    }

    #[test]
    fn test_location_from_flat_columns_and_nodes() {
        let flat = GraphRow::from_columns(columns(json!({
            "file_path": "a.py", "start_line": 2, "end_line": 5
        })));
        assert_eq!(flat.code_location().unwrap().path, "a.py");

        let via_node = GraphRow::from_columns(columns(json!({"count": 1}))).with_node(GraphNodeRef {
            element_id: "4:x:1".into(),
            labels: vec!["FUNCTION".into()],
            properties: columns(json!({"code": "<CODE>{\"S\":1,\"E\":2,\"F\":\"b.py\"}</CODE>"})),
        });
        assert_eq!(via_node.code_location().unwrap().path, "b.py");

        let none = GraphRow::from_columns(columns(json!({"count": 12})));
        assert_eq!(none.code_location(), None);
    }

    #[test]
    fn test_every_distinct_location_is_listed() {
        let row = GraphRow::from_columns(columns(json!({
            "c.code": "<CODE>{\"S\":1,\"E\":40,\"F\":\"app/user.py\"}</CODE>",
            "m.code": "<CODE>{\"S\":5,\"E\":9,\"F\":\"app/user.py\"}</CODE>"
        })))
        .with_node(GraphNodeRef {
            element_id: "4:x:1".into(),
            labels: vec!["CLASS".into()],
            properties: columns(json!({"code": "<CODE>{\"S\":1,\"E\":40,\"F\":\"app/user.py\"}</CODE>"})),
        });

        let spans: Vec<(u64, u64)> = row
            .code_locations()
            .iter()
            .map(|l| (l.start_line, l.end_line))
            .collect();
        assert_eq!(spans, vec![(1, 40), (5, 9)]);
        assert_eq!(row.node_ids(), vec!["4:x:1"]);
    }

    #[test]
    fn test_labels_deduplicated() {
        let node = |id: &str, label: &str| GraphNodeRef {
            element_id: id.into(),
            labels: vec![label.into()],
            properties: Map::new(),
        };
        let row = GraphRow::default()
            .with_node(node("1", "CLASS"))
            .with_node(node("2", "METHOD"))
            .with_node(node("3", "CLASS"));
        assert_eq!(row.labels(), vec!["CLASS", "METHOD"]);
    }

    #[test]
    fn test_text_column_suffix_lookup() {
        let row = GraphRow::from_columns(columns(json!({"class_name": "User", "m.name": "save", "type": "method"})));
        assert_eq!(row.text_column("name"), Some("save"));
        assert_eq!(row.text_column("type"), Some("method"));
        assert_eq!(row.text_column("signature"), None);
    }
}
