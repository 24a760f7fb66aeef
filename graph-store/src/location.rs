use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const CODE_OPEN: &str = "<CODE>";
const CODE_CLOSE: &str = "</CODE>";

/// A file range referenced by a graph node, 1-indexed and inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CodeLocation {
    pub path: String,
    pub start_line: u64,
    pub end_line: u64,
}

#[derive(Deserialize)]
struct EncodedLocation {
    #[serde(rename = "S")]
    start: u64,
    #[serde(rename = "E")]
    end: u64,
    #[serde(rename = "F")]
    file: String,
}

impl CodeLocation {
    /// Decode the indexer's `<CODE>{"S":start,"E":end,"F":"path"}</CODE>` reference.
    pub fn decode(value: &str) -> Option<Self> {
        let inner = value
            .trim()
            .strip_prefix(CODE_OPEN)?
            .strip_suffix(CODE_CLOSE)?;
        let encoded: EncodedLocation = serde_json::from_str(inner).ok()?;
        if encoded.file.is_empty() {
            return None;
        }
        Some(Self {
            path: encoded.file,
            start_line: encoded.start,
            end_line: encoded.end.max(encoded.start),
        })
    }

    pub fn encode(&self) -> String {
        let inner = serde_json::json!({ "S": self.start_line, "E": self.end_line, "F": self.path });
        format!("{CODE_OPEN}{inner}{CODE_CLOSE}")
    }

    /// Location carried by a property map: an encoded `code` property first,
    /// then plain `file_path` / `start_line` / `end_line` properties.
    pub fn from_properties(props: &Map<String, Value>) -> Option<Self> {
        if let Some(found) = props.get("code").and_then(Value::as_str).and_then(Self::decode) {
            return Some(found);
        }
        let path = props.get("file_path").and_then(Value::as_str)?;
        let start_line = props.get("start_line").and_then(Value::as_u64)?;
        let end_line = props
            .get("end_line")
            .and_then(Value::as_u64)
            .unwrap_or(start_line);
        Some(Self {
            path: path.to_string(),
            start_line,
            end_line: end_line.max(start_line),
        })
    }

    /// Lines `start_line..=end_line` of `contents`, clamped to its length.
    pub fn extract_lines(&self, contents: &str) -> String {
        let start = self.start_line.saturating_sub(1) as usize;
        let count = (self.end_line + 1).saturating_sub(self.start_line.max(1)) as usize;
        contents
            .lines()
            .skip(start)
            .take(count)
            .collect::<Vec<_>>()
            .join("\n")
            .trim_end()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_decode_code_reference() {
        let loc = CodeLocation::decode(r#"<CODE>{"S":10,"E":24,"F":"/app/models/user.py"}</CODE>"#)
            .unwrap();
        assert_eq!(
            loc,
            CodeLocation {
                path: "/app/models/user.py".to_string(),
                start_line: 10,
                end_line: 24,
            }
        );
        assert_eq!(CodeLocation::decode(&loc.encode()), Some(loc));
    }

    #[test]
    fn test_decode_rejects_plain_code() {
        assert_eq!(CodeLocation::decode("class User: pass"), None);
        assert_eq!(CodeLocation::decode("<CODE>{bad json}</CODE>"), None);
        assert_eq!(CodeLocation::decode(r#"<CODE>{"S":1,"E":2,"F":""}</CODE>"#), None);
    }

    #[test]
    fn test_from_properties_fallback_columns() {
        let props = json!({"name": "save", "file_path": "app/db.py", "start_line": 7});
        let loc = CodeLocation::from_properties(props.as_object().unwrap()).unwrap();
        assert_eq!(loc.start_line, 7);
        assert_eq!(loc.end_line, 7);

        let no_lines = json!({"name": "save", "file_path": "app/db.py"});
        assert_eq!(CodeLocation::from_properties(no_lines.as_object().unwrap()), None);
    }

    #[test]
    fn test_extract_lines() {
        let contents = "line1\nline2\nline3\nline4\n";
        let loc = CodeLocation {
            path: "f".to_string(),
            start_line: 2,
            end_line: 3,
        };
        assert_eq!(loc.extract_lines(contents), "line2\nline3");

        let past_end = CodeLocation {
            path: "f".to_string(),
            start_line: 4,
            end_line: 40,
        };
        assert_eq!(past_end.extract_lines(contents), "line4");
    }
}
