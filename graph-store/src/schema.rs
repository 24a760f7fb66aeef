use serde::{Deserialize, Serialize};
use std::fmt::Write;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeLabelSchema {
    pub label: String,
    #[serde(default)]
    pub properties: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipSchema {
    pub rel_type: String,
    /// Labels allowed at the start of the relationship
    #[serde(default)]
    pub from: Vec<String>,
    /// Labels allowed at the end of the relationship
    #[serde(default)]
    pub to: Vec<String>,
    #[serde(default)]
    pub properties: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedProperty {
    pub label: String,
    pub property: String,
}

/// Node labels, relationship types and indexed properties of a graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphSchemaDescriptor {
    pub node_labels: Vec<NodeLabelSchema>,
    pub relationship_types: Vec<RelationshipSchema>,
    #[serde(default)]
    pub indexed_properties: Vec<IndexedProperty>,
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

fn node(label: &str, properties: &[&str]) -> NodeLabelSchema {
    NodeLabelSchema {
        label: label.to_string(),
        properties: owned(properties),
    }
}

fn rel(rel_type: &str, from: &[&str], to: &[&str], properties: &[&str]) -> RelationshipSchema {
    RelationshipSchema {
        rel_type: rel_type.to_string(),
        from: owned(from),
        to: owned(to),
        properties: owned(properties),
    }
}

impl GraphSchemaDescriptor {
    /// Schema of the code property graph produced by the indexer.
    pub fn code_property_graph() -> Self {
        let node_labels = vec![
            node("MODULE", &["name", "file_path"]),
            node("CLASS", &["name", "file_path", "signature", "code"]),
            node("FUNCTION", &["name", "file_path", "signature", "code"]),
            node("METHOD", &["name", "file_path", "signature", "code", "class"]),
            node("FIELD", &["name", "file_path", "class"]),
            node("GLOBAL_VARIABLE", &["name", "file_path", "code"]),
        ];
        let relationship_types = vec![
            rel(
                "CONTAINS",
                &["MODULE"],
                &["CLASS", "FUNCTION", "GLOBAL_VARIABLE"],
                &[],
            ),
            rel("HAS_METHOD", &["CLASS"], &["METHOD"], &[]),
            rel("HAS_FIELD", &["CLASS"], &["FIELD"], &[]),
            rel("INHERITS", &["CLASS"], &["CLASS"], &[]),
            rel(
                "USES",
                &["FUNCTION", "METHOD"],
                &["GLOBAL_VARIABLE", "FIELD"],
                &["source_association_type", "target_association_type"],
            ),
        ];
        let indexed_properties = [
            ("MODULE", "file_path"),
            ("CLASS", "name"),
            ("FUNCTION", "name"),
            ("METHOD", "name"),
            ("GLOBAL_VARIABLE", "name"),
            ("FIELD", "name"),
        ]
        .into_iter()
        .map(|(label, property)| IndexedProperty {
            label: label.to_string(),
            property: property.to_string(),
        })
        .collect();

        Self {
            node_labels,
            relationship_types,
            indexed_properties,
        }
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.node_labels.iter().any(|n| n.label == label)
    }

    pub fn has_relationship_type(&self, rel_type: &str) -> bool {
        self.relationship_types.iter().any(|r| r.rel_type == rel_type)
    }

    pub fn label_names(&self) -> Vec<&str> {
        self.node_labels.iter().map(|n| n.label.as_str()).collect()
    }

    pub fn relationship_names(&self) -> Vec<&str> {
        self.relationship_types
            .iter()
            .map(|r| r.rel_type.as_str())
            .collect()
    }

    /// Plain-text rendering for prompts.
    pub fn describe(&self) -> String {
        let mut out = String::from("NODES:\n");
        for n in &self.node_labels {
            let _ = writeln!(out, "- {}: {{{}}}", n.label, n.properties.join(", "));
        }
        out.push_str("\nRELATIONSHIPS:\n");
        for r in &self.relationship_types {
            let props = if r.properties.is_empty() {
                String::new()
            } else {
                format!(" {{{}}}", r.properties.join(", "))
            };
            let _ = writeln!(
                out,
                "- (:{})-[:{}{props}]->(:{})",
                r.from.join("|:"),
                r.rel_type,
                r.to.join("|:")
            );
        }
        if !self.indexed_properties.is_empty() {
            out.push_str("\nINDEXED PROPERTIES:\n");
            for p in &self.indexed_properties {
                let _ = writeln!(out, "- {}.{}", p.label, p.property);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_code_property_graph_contents() {
        let schema = GraphSchemaDescriptor::code_property_graph();
        assert_eq!(
            schema.label_names(),
            vec!["MODULE", "CLASS", "FUNCTION", "METHOD", "FIELD", "GLOBAL_VARIABLE"]
        );
        assert_eq!(
            schema.relationship_names(),
            vec!["CONTAINS", "HAS_METHOD", "HAS_FIELD", "INHERITS", "USES"]
        );
        assert!(schema.has_label("CLASS"));
        assert!(!schema.has_label("Class"));
        assert!(schema.has_relationship_type("USES"));
        assert!(!schema.has_relationship_type("CALLS"));
    }

    #[test]
    fn test_describe() {
        let text = GraphSchemaDescriptor::code_property_graph().describe();
        assert!(text.contains("- METHOD: {name, file_path, signature, code, class}"));
        assert!(text.contains("- (:MODULE)-[:CONTAINS]->(:CLASS|:FUNCTION|:GLOBAL_VARIABLE)"));
        assert!(text.contains(
            "- (:FUNCTION|:METHOD)-[:USES {source_association_type, target_association_type}]->(:GLOBAL_VARIABLE|:FIELD)"
        ));
        assert!(text.contains("- CLASS.name"));
    }
}
