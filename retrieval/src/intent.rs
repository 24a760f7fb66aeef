use crate::call::{CallFailure, PromptMode, call_structured};
use crate::error::IntentExtractionError;
use crate::history::IterationHistory;
use crate::prompts;
use crate::query::Query;
use codexgraph_llm::{CallSite, CompletionOptions, LanguageModel, parse_json_object};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::debug;

fn compile_regex(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|err| panic!("invalid regex literal {pattern}: {err}"))
}

static PATH_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| compile_regex(r"(?:^|\s)((?:\./)?[\w.-]+(?:/[\w.-]+)*/)(?:\s|$|[,.?!])"));

/// Node kinds of the code property graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Module,
    Class,
    Function,
    Method,
    Field,
    GlobalVariable,
}

impl EntityKind {
    pub const ALL: [EntityKind; 6] = [
        EntityKind::Module,
        EntityKind::Class,
        EntityKind::Function,
        EntityKind::Method,
        EntityKind::Field,
        EntityKind::GlobalVariable,
    ];

    /// Graph label for this kind.
    pub fn label(self) -> &'static str {
        match self {
            EntityKind::Module => "MODULE",
            EntityKind::Class => "CLASS",
            EntityKind::Function => "FUNCTION",
            EntityKind::Method => "METHOD",
            EntityKind::Field => "FIELD",
            EntityKind::GlobalVariable => "GLOBAL_VARIABLE",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.label().eq_ignore_ascii_case(label))
    }

    /// Lenient name lookup: labels, snake/camel case, plurals and common synonyms.
    pub fn parse(name: &str) -> Option<Self> {
        let normalized: String = name
            .trim()
            .chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_lowercase)
            .collect();
        Self::lookup(&normalized)
            .or_else(|| normalized.strip_suffix("es").and_then(Self::lookup))
            .or_else(|| normalized.strip_suffix('s').and_then(Self::lookup))
    }

    fn lookup(word: &str) -> Option<Self> {
        let kind = match word {
            "module" | "file" | "package" => EntityKind::Module,
            "class" | "struct" | "interface" => EntityKind::Class,
            "function" | "func" | "fn" => EntityKind::Function,
            "method" => EntityKind::Method,
            "field" | "attribute" | "property" | "properties" | "member" => EntityKind::Field,
            "globalvariable" | "global" | "variable" | "constant" => EntityKind::GlobalVariable,
            _ => return None,
        };
        Some(kind)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Module => "module",
            EntityKind::Class => "class",
            EntityKind::Function => "function",
            EntityKind::Method => "method",
            EntityKind::Field => "field",
            EntityKind::GlobalVariable => "global_variable",
        };
        f.write_str(name)
    }
}

/// Map a relationship name or synonym onto a graph relationship type.
pub fn normalize_relationship(name: &str) -> Option<&'static str> {
    let key: String = name
        .trim()
        .trim_start_matches(':')
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect();
    let rel = match key.as_str() {
        "contains" | "contain" | "defines" | "define" | "containment" => "CONTAINS",
        "hasmethod" | "hasmethods" | "methods" => "HAS_METHOD",
        "hasfield" | "hasfields" | "fields" | "attributes" => "HAS_FIELD",
        "inherits" | "inherit" | "inheritance" | "extends" | "subclass" | "subclasses"
        | "subclassof" | "parent" | "parents" | "superclass" => "INHERITS",
        "uses" | "use" | "usage" | "usages" | "references" | "reads" | "writes" => "USES",
        _ => return None,
    };
    Some(rel)
}

/// Path and language limits on what counts as relevant
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl Scope {
    pub fn is_unrestricted(&self) -> bool {
        self.path_prefix.is_none() && self.language.is_none()
    }
}

/// Semantic annotation of a query for one iteration.
///
/// Empty `targets` means every entity kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredIntent {
    pub targets: Vec<EntityKind>,
    pub relationships: Vec<String>,
    pub scope: Scope,
    pub ambiguous: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus: Option<String>,
}

impl StructuredIntent {
    /// Targets with the empty list expanded to every kind.
    pub fn effective_targets(&self) -> Vec<EntityKind> {
        if self.targets.is_empty() {
            EntityKind::ALL.to_vec()
        } else {
            self.targets.clone()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct IntentReply {
    #[serde(default)]
    targets: OneOrMany,
    #[serde(default)]
    relationships: OneOrMany,
    #[serde(default)]
    scope: ScopeReply,
    #[serde(default)]
    ambiguous: bool,
    #[serde(default)]
    focus: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    #[default]
    None,
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::None => Vec::new(),
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(untagged)]
enum ScopeReply {
    #[default]
    Unrestricted,
    /// `"all"`, `"codebase"`, ...
    Named(String),
    Fields {
        #[serde(default)]
        path_prefix: Option<String>,
        #[serde(default)]
        path: Option<String>,
        #[serde(default)]
        language: Option<String>,
    },
}

const LANGUAGES: &[&str] = &[
    "python",
    "rust",
    "javascript",
    "typescript",
    "java",
    "go",
    "kotlin",
    "ruby",
    "php",
    "csharp",
    "cpp",
];

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Turns a query plus history into a [`StructuredIntent`].
pub struct IntentExtractor {
    model: Arc<dyn LanguageModel>,
    timeout: Duration,
}

impl IntentExtractor {
    pub fn new(model: Arc<dyn LanguageModel>, timeout: Duration) -> Self {
        Self { model, timeout }
    }

    pub async fn extract(
        &self,
        query: &Query,
        history: &IterationHistory,
    ) -> Result<StructuredIntent, IntentExtractionError> {
        let options = CompletionOptions::json(CallSite::IntentExtraction)
            .with_system(prompts::INTENT_SYSTEM_PROMPT);

        let build = |mode: PromptMode, feedback: Option<&str>| {
            prompts::intent_prompt(query, history, mode, feedback)
        };
        let parse =
            |text: &str| parse_json_object::<IntentReply>(text).map_err(|e| e.to_string());

        let (reply, _attempts) =
            call_structured(self.model.as_ref(), &options, self.timeout, build, parse)
                .await
                .map_err(|failure| match failure {
                    CallFailure::Timeout(t) => IntentExtractionError::Timeout(t),
                    CallFailure::Collaborator(e) => IntentExtractionError::Collaborator(e),
                    CallFailure::Malformed(reason) => IntentExtractionError::Unparsable(reason),
                })?;

        let intent = resolve_intent(query, reply);
        debug!(?intent, "extracted intent");
        Ok(intent)
    }
}

/// Normalise a model reply, falling back to keyword inference over the query.
fn resolve_intent(query: &Query, reply: IntentReply) -> StructuredIntent {
    let mut targets: Vec<EntityKind> = reply
        .targets
        .into_vec()
        .iter()
        .filter_map(|t| EntityKind::parse(t))
        .collect();
    let mut ambiguous = reply.ambiguous;

    if targets.is_empty() {
        targets = infer_targets(query.text());
        if targets.is_empty() {
            // Broadest scope: every kind.
            ambiguous = true;
        }
    }
    targets.sort();
    targets.dedup();

    let mut relationships: Vec<String> = reply
        .relationships
        .into_vec()
        .iter()
        .filter_map(|r| normalize_relationship(r))
        .map(str::to_string)
        .collect();
    if relationships.is_empty() {
        relationships = infer_relationships(query.text());
    }
    relationships.sort();
    relationships.dedup();

    let mut scope = match reply.scope {
        ScopeReply::Unrestricted | ScopeReply::Named(_) => Scope::default(),
        ScopeReply::Fields {
            path_prefix,
            path,
            language,
        } => Scope {
            path_prefix: non_empty(path_prefix).or_else(|| non_empty(path)),
            language: non_empty(language).map(|l| l.to_lowercase()),
        },
    };
    if scope.path_prefix.is_none() {
        scope.path_prefix = infer_path_prefix(query.text());
    }
    if scope.language.is_none() {
        scope.language = infer_language(query.text());
    }

    StructuredIntent {
        targets,
        relationships,
        scope,
        ambiguous,
        focus: non_empty(reply.focus),
    }
}

fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
}

/// Entity kinds named anywhere in free text.
pub fn infer_targets(text: &str) -> Vec<EntityKind> {
    let mut kinds: Vec<EntityKind> = words(text).filter_map(EntityKind::parse).collect();
    kinds.sort();
    kinds.dedup();
    kinds
}

/// Relationship types implied by free text.
pub fn infer_relationships(text: &str) -> Vec<String> {
    let mut rels: Vec<String> = words(text)
        .filter_map(normalize_relationship)
        .map(str::to_string)
        .collect();
    rels.sort();
    rels.dedup();
    rels
}

fn infer_path_prefix(text: &str) -> Option<String> {
    PATH_PATTERN
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim_start_matches("./").to_string())
}

fn infer_language(text: &str) -> Option<String> {
    let lower = text.to_lowercase();
    words(&lower)
        .find(|w| LANGUAGES.contains(w))
        .map(str::to_string)
}
