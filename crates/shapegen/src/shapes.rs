//! Turtle document helpers: the fixed prefix header, extraction of the
//! document from model output, and a deterministic skeleton renderer.
//!
//! Every document that leaves the pipeline starts with [`prefix_header`].
//! [`normalize_document`] enforces that for model output by dropping the
//! model's own declarations of the standard prefixes and emitting the
//! canonical ones first.

use crate::records::{EntityRecord, PropertyRecord, properties_of};

/// Prefixes emitted at the top of every generated document, in order.
pub const PREFIXES: &[(&str, &str)] = &[
    ("ex", "http://example.org/"),
    ("sh", "http://www.w3.org/ns/shacl#"),
    ("rdf", "http://www.w3.org/1999/02/22-rdf-syntax-ns#"),
    ("rdfs", "http://www.w3.org/2000/01/rdf-schema#"),
    ("xsd", "http://www.w3.org/2001/XMLSchema#"),
    ("schema", "https://schema.org/"),
];

/// The canonical prefix block, one `@prefix` line per entry of [`PREFIXES`].
pub fn prefix_header() -> String {
    PREFIXES
        .iter()
        .map(|(name, iri)| format!("@prefix {name}: <{iri}> .\n"))
        .collect()
}

/// A generated constraint document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintDocument(String);

impl ConstraintDocument {
    /// Wrap already-normalized Turtle.
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Normalize raw model output into a document.
    pub fn from_completion(completion: &str) -> Self {
        Self(normalize_document(completion))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConstraintDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pull the Turtle body out of a model answer.
///
/// Takes the contents of the first fenced code block (any info string) when
/// one exists, otherwise the whole answer. An answer cut off before its
/// closing fence keeps everything after the opening one, minus fence lines.
/// The result is trimmed.
pub fn extract_document(text: &str) -> String {
    if let Some((_, after_open)) = text.split_once("```") {
        // Skip the info string (`turtle`, `ttl`, ...) up to the newline.
        let body = after_open.split_once('\n').map_or("", |(_, body)| body);
        return match body.split_once("```") {
            Some((inner, _)) => inner.trim().to_string(),
            None => without_fence_lines(body),
        };
    }
    text.trim().to_string()
}

fn without_fence_lines(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Name declared by a `@prefix` / `PREFIX` line, if the line is one.
fn declared_prefix(line: &str) -> Option<(&str, bool)> {
    let trimmed = line.trim_start();
    let (rest, turtle_style) = if let Some(rest) = trimmed.strip_prefix("@prefix") {
        (rest, true)
    } else if let Some(rest) = trimmed
        .strip_prefix("PREFIX")
        .or_else(|| trimmed.strip_prefix("prefix"))
    {
        (rest, false)
    } else {
        return None;
    };
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let (name, _) = rest.trim_start().split_once(':')?;
    Some((name.trim(), turtle_style))
}

/// Break a line holding several declarations into one line per
/// declaration. Whatever follows the last declaration becomes its own line.
fn split_declarations(line: &str) -> Vec<String> {
    if declared_prefix(line).is_none() {
        return vec![line.to_string()];
    }
    let mut pieces = Vec::new();
    let mut rest = line.trim();
    while declared_prefix(rest).is_some() {
        let Some((declaration, tail)) = rest.split_once('>') else {
            break;
        };
        pieces.push(format!("{declaration}>"));
        let tail = tail.trim_start();
        rest = tail.strip_prefix('.').unwrap_or(tail).trim_start();
    }
    if !rest.is_empty() {
        pieces.push(rest.to_string());
    }
    pieces
}

/// Extract the document from a model answer and give it the canonical header.
///
/// Declarations of the standard prefix names are replaced by the canonical
/// ones; other `@prefix` declarations are kept, each on its own line with a
/// terminating `.`.
pub fn normalize_document(completion: &str) -> String {
    let body = extract_document(completion);
    let mut kept = Vec::new();
    for line in body.lines().flat_map(split_declarations) {
        match declared_prefix(&line) {
            Some((name, _)) if PREFIXES.iter().any(|(p, _)| *p == name) => continue,
            Some((_, true)) if !line.trim_end().ends_with('.') => {
                kept.push(format!("{} .", line.trim_end()));
            }
            _ => kept.push(line),
        }
    }
    let rest = kept.join("\n");
    format!("{}\n{}\n", prefix_header(), rest.trim())
}

/// How a property range hint maps onto SHACL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeConstraint {
    /// A literal type: `sh:datatype xsd:<name>`.
    Datatype(&'static str),
    /// A schema.org class: `sh:class schema:<name>`.
    Class(String),
}

/// Map a schema.org "Expected Type" hint to a SHACL constraint.
///
/// Hints like `Text or URL` use the first alternative.
pub fn range_constraint(range: &str) -> RangeConstraint {
    let first = range
        .split(" or ")
        .next()
        .unwrap_or(range)
        .trim()
        .trim_start_matches("schema:");
    let datatype = match first.to_ascii_lowercase().as_str() {
        "text" | "string" | "" => "string",
        "number" | "float" | "decimal" => "decimal",
        "integer" | "int" => "integer",
        "boolean" | "bool" => "boolean",
        "date" => "date",
        "datetime" => "dateTime",
        "time" => "time",
        "url" | "uri" => "anyURI",
        "duration" => "duration",
        _ if crate::records::is_valid_name(first) => {
            return RangeConstraint::Class(first.to_string());
        }
        _ => "string",
    };
    RangeConstraint::Datatype(datatype)
}

/// Escape a string for a Turtle `"..."` literal.
pub fn escape_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

fn render_property(prop: &PropertyRecord) -> String {
    let mut lines = vec![
        format!("sh:path schema:{}", prop.name),
        format!("sh:name \"{}\"", escape_literal(&prop.name)),
        format!("sh:description \"{}\"", escape_literal(&prop.description)),
    ];
    match range_constraint(&prop.range) {
        RangeConstraint::Datatype(dt) => {
            lines.push(format!("sh:datatype xsd:{dt}"));
            lines.push("sh:minCount 1".to_string());
            lines.push("sh:maxCount 1".to_string());
        }
        RangeConstraint::Class(class) => {
            lines.push(format!("sh:class schema:{class}"));
            lines.push("sh:minCount 1".to_string());
        }
    }
    let body: String = lines
        .iter()
        .map(|l| format!("        {l} ;\n"))
        .collect();
    format!("    sh:property [\n{body}    ]")
}

/// Render a complete document with exactly one NodeShape per entity and
/// one property shape per property.
pub fn render_skeleton(entities: &[EntityRecord], properties: &[PropertyRecord]) -> String {
    let mut out = prefix_header();
    for entity in entities {
        let mut statements = vec![
            "    a sh:NodeShape".to_string(),
            format!("    sh:targetClass schema:{}", entity.name),
            format!(
                "    rdfs:comment \"{}\"",
                escape_literal(&entity.description)
            ),
        ];
        statements.extend(properties_of(properties, &entity.name).map(render_property));
        out.push_str(&format!(
            "\nex:{}Shape\n{} .\n",
            entity.name,
            statements.join(" ;\n")
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lists_all_prefixes_in_order() {
        let header = prefix_header();
        assert!(header.starts_with("@prefix ex: <http://example.org/> .\n"));
        assert_eq!(header.lines().count(), PREFIXES.len());
        assert!(header.contains("@prefix schema: <https://schema.org/> ."));
    }

    #[test]
    fn extract_prefers_fenced_block() {
        let text = "Here you go:\n```turtle\nex:A a sh:NodeShape .\n```\nHope it helps!";
        assert_eq!(extract_document(text), "ex:A a sh:NodeShape .");
    }

    #[test]
    fn extract_without_fence_returns_trimmed_text() {
        assert_eq!(extract_document("  ex:A a sh:NodeShape .\n"), "ex:A a sh:NodeShape .");
    }

    #[test]
    fn extract_with_unterminated_fence_drops_fence_lines() {
        let text = "Sure:\n```turtle\nex:A a sh:NodeShape ;\n    sh:targetClass schema:Car .";
        assert_eq!(
            extract_document(text),
            "ex:A a sh:NodeShape ;\n    sh:targetClass schema:Car ."
        );
    }

    #[test]
    fn normalize_replaces_standard_prefixes_and_keeps_custom_ones() {
        let text = "```ttl\n@prefix schema: <http://schema.org/> .\n@prefix foaf: <http://xmlns.com/foaf/0.1/>\nex:A a sh:NodeShape .\n```";
        let doc = normalize_document(text);
        assert!(doc.starts_with(&prefix_header()));
        assert!(!doc.contains("http://schema.org/"));
        assert!(doc.contains("@prefix foaf: <http://xmlns.com/foaf/0.1/> ."));
        assert!(doc.trim_end().ends_with("ex:A a sh:NodeShape ."));
    }

    #[test]
    fn normalize_splits_declarations_sharing_a_line() {
        let text = "@prefix sh: <http://www.w3.org/ns/shacl#> . @prefix foaf: <http://xmlns.com/foaf/0.1/> .\nex:A a sh:NodeShape .";
        let doc = normalize_document(text);
        assert_eq!(doc.matches("shacl#").count(), 1);
        assert!(doc.contains("\n@prefix foaf: <http://xmlns.com/foaf/0.1/> .\n"));
    }

    #[test]
    fn declarations_followed_by_statements_keep_the_statements() {
        assert_eq!(
            split_declarations("@prefix foaf: <http://xmlns.com/foaf/0.1/> . ex:A a foaf:Person ."),
            ["@prefix foaf: <http://xmlns.com/foaf/0.1/>", "ex:A a foaf:Person ."]
        );
        assert_eq!(split_declarations("    sh:path schema:name ;"), ["    sh:path schema:name ;"]);
    }

    #[test]
    fn normalize_handles_sparql_style_prefixes() {
        let doc = normalize_document("PREFIX sh: <http://www.w3.org/ns/shacl#>\nex:A a sh:NodeShape .");
        assert_eq!(doc.matches("shacl#").count(), 1);
    }

    #[test]
    fn range_mapping() {
        assert_eq!(range_constraint("Text"), RangeConstraint::Datatype("string"));
        assert_eq!(range_constraint("Date"), RangeConstraint::Datatype("date"));
        assert_eq!(range_constraint("DateTime"), RangeConstraint::Datatype("dateTime"));
        assert_eq!(range_constraint("Text or URL"), RangeConstraint::Datatype("string"));
        assert_eq!(
            range_constraint("Organization"),
            RangeConstraint::Class("Organization".into())
        );
        assert_eq!(
            range_constraint("schema:Person"),
            RangeConstraint::Class("Person".into())
        );
        assert_eq!(range_constraint("two words"), RangeConstraint::Datatype("string"));
    }

    #[test]
    fn escape_quotes_and_newlines() {
        assert_eq!(escape_literal("a \"b\"\nc"), "a \\\"b\\\"\\nc");
    }

    #[test]
    fn skeleton_has_one_shape_per_entity_and_property() {
        let entities = vec![
            EntityRecord::new("Car", "A vehicle"),
            EntityRecord::new("Person", "A human owner"),
        ];
        let properties = vec![
            PropertyRecord::new("Car", "name", "The name.", "Text"),
            PropertyRecord::new("Car", "owner", "The owner.", "Person"),
            PropertyRecord::new("Person", "givenName", "Given name.", "Text"),
        ];
        let doc = render_skeleton(&entities, &properties);
        assert!(doc.starts_with(&prefix_header()));
        assert_eq!(doc.matches("a sh:NodeShape").count(), 2);
        assert_eq!(doc.matches("sh:property [").count(), 3);
        assert!(doc.contains("sh:class schema:Person"));
        assert!(doc.contains("sh:targetClass schema:Car"));
    }
}
