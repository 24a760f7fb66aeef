//! Static checks on generated Cypher before it reaches the graph store.

use codexgraph_graph_store::GraphSchemaDescriptor;
use codexgraph_llm::strip_code_fences;
use regex_lite::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

fn compile_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|err| panic!("invalid regex literal {pattern}: {err}"))
}

static WRITE_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    compile_regex(r"(?i)(?:^|[^.\w])(CREATE|MERGE|DELETE|DETACH|SET|REMOVE|DROP|FOREACH)\b")
});
static LOAD_CSV: LazyLock<Regex> = LazyLock::new(|| compile_regex(r"(?i)\bLOAD\s+CSV\b"));
static ADMIN_CALL: LazyLock<Regex> =
    LazyLock::new(|| compile_regex(r"(?i)\bCALL\s+(dbms|db\.create|apoc\.(create|merge|refactor|periodic))"));
static PROPERTY_EXISTS: LazyLock<Regex> =
    LazyLock::new(|| compile_regex(r"(?i)\bexists\s*\(\s*[A-Za-z_]\w*\s*\.\s*\w+\s*\)"));
static RETURN_CLAUSE: LazyLock<Regex> = LazyLock::new(|| compile_regex(r"(?i)\bRETURN\b"));
static UNION: LazyLock<Regex> = LazyLock::new(|| compile_regex(r"(?i)\bUNION(?:\s+ALL)?\b"));
static RETURN_TAIL: LazyLock<Regex> =
    LazyLock::new(|| compile_regex(r"(?i)\b(ORDER\s+BY|SKIP|LIMIT)\b"));
static ALIAS: LazyLock<Regex> =
    LazyLock::new(|| compile_regex(r"(?i)\s+AS\s+(`[^`]+`|[A-Za-z_]\w*)\s*$"));
static VARIABLE_LABEL: LazyLock<Regex> =
    LazyLock::new(|| compile_regex(r"\(\s*([A-Za-z_]\w*)\s*:\s*`?([A-Za-z_]\w*)"));

const MIN_QUERY_LEN: usize = 8;

/// Labels and relationship types a query mentions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CypherReferences {
    pub labels: BTreeSet<String>,
    pub relationship_types: BTreeSet<String>,
}

/// Strip fences, collapse whitespace and drop a trailing semicolon.
pub fn clean_query(raw: &str) -> String {
    let body = strip_code_fences(raw);
    let collapsed = body.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.trim_end_matches(';').trim().to_string()
}

/// Check that `query` is read-only, well formed and only names schema elements.
pub fn validate_query(
    query: &str,
    schema: &GraphSchemaDescriptor,
) -> Result<CypherReferences, String> {
    if query.trim().len() < MIN_QUERY_LEN {
        return Err("query is empty or too short".to_string());
    }

    let skeleton = strip_string_literals(query);

    if let Some(found) = WRITE_CLAUSE.captures(&skeleton).and_then(|c| c.get(1)) {
        return Err(format!(
            "query must be read-only, found {}",
            found.as_str().to_uppercase()
        ));
    }
    if LOAD_CSV.is_match(&skeleton) || ADMIN_CALL.is_match(&skeleton) {
        return Err("query must be read-only, found a procedure or import call".to_string());
    }
    if PROPERTY_EXISTS.is_match(&skeleton) {
        return Err("exists(n.prop) is not supported, use `n.prop IS NOT NULL`".to_string());
    }
    if !RETURN_CLAUSE.is_match(&skeleton) {
        return Err("query must RETURN results".to_string());
    }

    check_brackets(&skeleton)?;
    check_union_columns(&skeleton)?;

    let refs = collect_references(&skeleton);
    let unknown_labels: Vec<&str> = refs
        .labels
        .iter()
        .filter(|l| !schema.has_label(l))
        .map(String::as_str)
        .collect();
    if !unknown_labels.is_empty() {
        return Err(format!(
            "unknown node label(s) {}; valid labels are {}",
            unknown_labels.join(", "),
            schema.label_names().join(", ")
        ));
    }
    let unknown_rels: Vec<&str> = refs
        .relationship_types
        .iter()
        .filter(|r| !schema.has_relationship_type(r))
        .map(String::as_str)
        .collect();
    if !unknown_rels.is_empty() {
        return Err(format!(
            "unknown relationship type(s) {}; valid types are {}",
            unknown_rels.join(", "),
            schema.relationship_names().join(", ")
        ));
    }

    Ok(refs)
}

/// Variables bound to a label in node patterns, e.g. `(c:CLASS)` gives `c -> CLASS`.
pub fn variable_labels(query: &str) -> BTreeMap<String, String> {
    let skeleton = strip_string_literals(query);
    VARIABLE_LABEL
        .captures_iter(&skeleton)
        .filter_map(|c| Some((c.get(1)?.as_str().to_string(), c.get(2)?.as_str().to_string())))
        .collect()
}

/// Empty every quoted string so keywords and brackets inside literals are ignored.
fn strip_string_literals(query: &str) -> String {
    let mut out = String::with_capacity(query.len());
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for ch in query.chars() {
        match quote {
            Some(q) => {
                if escaped {
                    escaped = false;
                } else if ch == '\\' {
                    escaped = true;
                } else if ch == q {
                    quote = None;
                    out.push(ch);
                }
            }
            None => {
                if ch == '\'' || ch == '"' {
                    quote = Some(ch);
                }
                out.push(ch);
            }
        }
    }
    out
}

fn check_brackets(skeleton: &str) -> Result<(), String> {
    let mut stack: Vec<char> = Vec::new();
    for ch in skeleton.chars() {
        match ch {
            '(' | '[' | '{' => stack.push(ch),
            ')' | ']' | '}' => {
                let expected = match ch {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                if stack.pop() != Some(expected) {
                    return Err(format!("unbalanced brackets: unexpected '{ch}'"));
                }
            }
            _ => {}
        }
    }
    match stack.last() {
        Some(open) => Err(format!("unbalanced brackets: unclosed '{open}'")),
        None => Ok(()),
    }
}

fn check_union_columns(skeleton: &str) -> Result<(), String> {
    let parts: Vec<&str> = UNION.split(skeleton).collect();
    if parts.len() < 2 {
        return Ok(());
    }

    let mut expected: Option<Vec<String>> = None;
    for (branch, part) in parts.iter().enumerate() {
        let columns = return_columns(part)
            .ok_or_else(|| format!("UNION branch {} has no RETURN", branch + 1))?;
        match &expected {
            None => expected = Some(columns),
            Some(first) if *first != columns => {
                return Err(format!(
                    "UNION branches must return the same columns: [{}] vs [{}]",
                    first.join(", "),
                    columns.join(", ")
                ));
            }
            Some(_) => {}
        }
    }
    Ok(())
}

/// Column names of the last RETURN clause, aliases preferred.
fn return_columns(part: &str) -> Option<Vec<String>> {
    let start = RETURN_CLAUSE.find_iter(part).last()?.end();
    let mut clause = &part[start..];
    if let Some(tail) = RETURN_TAIL.find(clause) {
        clause = &clause[..tail.start()];
    }
    let clause = clause.trim();
    let clause = clause
        .strip_prefix("DISTINCT ")
        .or_else(|| clause.strip_prefix("distinct "))
        .unwrap_or(clause);

    Some(
        split_top_level(clause)
            .into_iter()
            .map(|item| match ALIAS.captures(item).and_then(|c| c.get(1)) {
                Some(alias) => alias.as_str().trim_matches('`').to_string(),
                None => item.trim().to_string(),
            })
            .collect(),
    )
}

fn split_top_level(clause: &str) -> Vec<&str> {
    let mut items = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (idx, ch) in clause.char_indices() {
        match ch {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            ',' if depth == 0 => {
                items.push(clause[start..idx].trim());
                start = idx + 1;
            }
            _ => {}
        }
    }
    let last = clause[start..].trim();
    if !last.is_empty() {
        items.push(last);
    }
    items
}

fn is_ident_start(ch: char) -> bool {
    ch.is_ascii_alphabetic() || ch == '_' || ch == '`'
}

/// Read one identifier (plain or backticked) starting at `idx`.
fn read_identifier(chars: &[char], mut idx: usize) -> (String, usize) {
    let mut name = String::new();
    if chars.get(idx) == Some(&'`') {
        idx += 1;
        while let Some(&ch) = chars.get(idx) {
            idx += 1;
            if ch == '`' {
                break;
            }
            name.push(ch);
        }
        return (name, idx);
    }
    while let Some(&ch) = chars.get(idx) {
        if ch.is_ascii_alphanumeric() || ch == '_' {
            name.push(ch);
            idx += 1;
        } else {
            break;
        }
    }
    (name, idx)
}

fn skip_spaces(chars: &[char], mut idx: usize) -> usize {
    while chars.get(idx).is_some_and(|c| c.is_whitespace()) {
        idx += 1;
    }
    idx
}

/// Labels after `:` in node patterns and predicates, relationship types
/// after `:` inside `[...]`. Colons inside map literals are ignored.
fn collect_references(skeleton: &str) -> CypherReferences {
    let chars: Vec<char> = skeleton.chars().collect();
    let mut refs = CypherReferences::default();
    let mut stack: Vec<char> = Vec::new();
    let mut quote: Option<char> = None;
    let mut idx = 0;

    while idx < chars.len() {
        let ch = chars[idx];
        if let Some(q) = quote {
            if ch == q {
                quote = None;
            }
            idx += 1;
            continue;
        }
        match ch {
            '\'' | '"' => quote = Some(ch),
            '(' | '[' | '{' => stack.push(ch),
            ')' | ']' | '}' => {
                stack.pop();
            }
            ':' if stack.last() != Some(&'{') => {
                let in_relationship = stack.last() == Some(&'[');
                let mut cursor = skip_spaces(&chars, idx + 1);
                loop {
                    if !chars.get(cursor).copied().is_some_and(is_ident_start) {
                        break;
                    }
                    let (name, next) = read_identifier(&chars, cursor);
                    if !name.is_empty() {
                        if in_relationship {
                            refs.relationship_types.insert(name);
                        } else {
                            refs.labels.insert(name);
                        }
                    }
                    cursor = skip_spaces(&chars, next);
                    // `:A:B`, `:A|B` and `:A|:B`
                    match chars.get(cursor) {
                        Some('|') | Some(':') => {
                            cursor = skip_spaces(&chars, cursor + 1);
                            if chars.get(cursor) == Some(&':') {
                                cursor = skip_spaces(&chars, cursor + 1);
                            }
                        }
                        _ => break,
                    }
                }
                idx = cursor;
                continue;
            }
            _ => {}
        }
        idx += 1;
    }
    refs
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn schema() -> GraphSchemaDescriptor {
        GraphSchemaDescriptor::code_property_graph()
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_clean_query() {
        assert_eq!(
            clean_query("```cypher\nMATCH (c:CLASS)\n  RETURN c.name;\n```"),
            "MATCH (c:CLASS) RETURN c.name"
        );
    }

    #[test]
    fn test_valid_query_references() {
        let refs = validate_query(
            "MATCH (c:CLASS {name: 'User'})-[:HAS_METHOD]->(m:METHOD) \
             WHERE m.name CONTAINS 'save:' RETURN c.name, m.name, m.code",
            &schema(),
        )
        .unwrap();
        assert_eq!(refs.labels, set(&["CLASS", "METHOD"]));
        assert_eq!(refs.relationship_types, set(&["HAS_METHOD"]));
    }

    #[test]
    fn test_alternation_and_predicates() {
        let refs = validate_query(
            "MATCH (m:MODULE)-[r:CONTAINS|:HAS_METHOD*1..2]->(n) \
             WHERE n:FUNCTION OR n:METHOD RETURN n.name AS name",
            &schema(),
        )
        .unwrap();
        assert_eq!(refs.labels, set(&["FUNCTION", "METHOD", "MODULE"]));
        assert_eq!(refs.relationship_types, set(&["CONTAINS", "HAS_METHOD"]));
    }

    #[test]
    fn test_write_clauses_rejected() {
        for query in [
            "MATCH (c:CLASS) DETACH DELETE c RETURN 1",
            "CREATE (c:CLASS {name: 'x'}) RETURN c",
            "MATCH (c:CLASS) SET c.name = 'y' RETURN c",
            "MERGE (c:CLASS {name: 'x'}) RETURN c",
            "LOAD CSV FROM 'file:///x' AS row RETURN row",
            "CALL dbms.components() YIELD name RETURN name",
        ] {
            let err = validate_query(query, &schema()).unwrap_err();
            assert!(err.contains("read-only"), "{query}: {err}");
        }
    }

    #[test]
    fn test_keywords_inside_strings_and_properties_allowed() {
        assert!(
            validate_query(
                "MATCH (f:FUNCTION) WHERE f.name = 'create_user' OR f.code CONTAINS 'DELETE FROM' \
                 RETURN f.name, f.set",
                &schema()
            )
            .is_ok()
        );
    }

    #[test]
    fn test_structural_errors() {
        assert_eq!(
            validate_query("MATCH (c:CLASS)", &schema()).unwrap_err(),
            "query must RETURN results"
        );
        assert!(
            validate_query("MATCH (c:CLASS RETURN c", &schema())
                .unwrap_err()
                .contains("unbalanced")
        );
        assert!(
            validate_query("MATCH (c:CLASS) WHERE exists(c.code) RETURN c", &schema())
                .unwrap_err()
                .contains("IS NOT NULL")
        );
        assert!(validate_query("RETURN", &schema()).is_err());
    }

    #[test]
    fn test_unknown_schema_elements() {
        let err = validate_query("MATCH (c:Klass) RETURN c", &schema()).unwrap_err();
        assert!(err.contains("Klass"));
        assert!(err.contains("CLASS"));

        let err = validate_query("MATCH (a:FUNCTION)-[:CALLS]->(b) RETURN b", &schema())
            .unwrap_err();
        assert!(err.contains("CALLS"));
    }

    #[test]
    fn test_union_columns_must_match() {
        let ok = "MATCH (c:CLASS) RETURN c.name AS name, c.file_path AS file_path \
                  UNION MATCH (f:FUNCTION) RETURN f.name AS name, f.file_path AS file_path";
        assert!(validate_query(ok, &schema()).is_ok());

        let bad = "MATCH (c:CLASS) RETURN c.name AS name \
                   UNION ALL MATCH (f:FUNCTION) RETURN f.name AS function_name";
        let err = validate_query(bad, &schema()).unwrap_err();
        assert!(err.contains("same columns"));
    }

    #[test]
    fn test_map_projection_colons_ignored() {
        let refs = validate_query(
            "MATCH (c:CLASS) RETURN c {.name, location: c.code} AS class ORDER BY c.name LIMIT 5",
            &schema(),
        )
        .unwrap();
        assert_eq!(refs.labels, set(&["CLASS"]));
    }

    #[test]
    fn test_variable_labels() {
        let vars = variable_labels("MATCH (c:CLASS)-[:HAS_METHOD]->(m :METHOD) RETURN m.name");
        assert_eq!(vars.get("c").map(String::as_str), Some("CLASS"));
        assert_eq!(vars.get("m").map(String::as_str), Some("METHOD"));
    }
}
