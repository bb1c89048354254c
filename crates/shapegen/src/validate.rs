//! Syntactic and structural validation of generated SHACL documents.
//!
//! The document is parsed as Turtle with `rio_turtle`; a parse failure is a
//! [`PipelineError::MalformedDocument`]. The resulting triples are then
//! checked against a handful of SHACL core rules:
//!
//! - at least one `sh:NodeShape` is declared;
//! - every NodeShape has a target (`sh:targetClass` and friends);
//! - every property shape has exactly one `sh:path`;
//! - `sh:minCount` / `sh:maxCount` are non-negative integers with min ≤ max;
//! - a property shape does not declare both `sh:datatype` and `sh:class`;
//! - every term in the `sh:` namespace is part of SHACL core.
//!
//! Diagnostics are reported in discovery order. This is not a SHACL
//! engine: no data graph is involved.

use std::collections::HashMap;
use std::fmt;

use rio_api::model::{Literal, Subject, Term, Triple};
use rio_api::parser::TriplesParser;
use rio_turtle::{TurtleError, TurtleParser};
use tracing::debug;

use crate::PipelineError;
use crate::oracle::{ValidationOracle, ValidationReport};
use crate::shapes::PREFIXES;

const SH: &str = "http://www.w3.org/ns/shacl#";
const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
const XSD: &str = "http://www.w3.org/2001/XMLSchema#";

/// Local names of the SHACL core vocabulary.
const SHACL_CORE: &[&str] = &[
    "NodeShape",
    "PropertyShape",
    "Shape",
    "targetClass",
    "targetNode",
    "targetSubjectsOf",
    "targetObjectsOf",
    "property",
    "path",
    "inversePath",
    "alternativePath",
    "zeroOrMorePath",
    "oneOrMorePath",
    "zeroOrOnePath",
    "name",
    "description",
    "order",
    "group",
    "defaultValue",
    "datatype",
    "class",
    "nodeKind",
    "IRI",
    "Literal",
    "BlankNode",
    "BlankNodeOrIRI",
    "BlankNodeOrLiteral",
    "IRIOrLiteral",
    "minCount",
    "maxCount",
    "minLength",
    "maxLength",
    "pattern",
    "flags",
    "languageIn",
    "uniqueLang",
    "minInclusive",
    "maxInclusive",
    "minExclusive",
    "maxExclusive",
    "equals",
    "disjoint",
    "lessThan",
    "lessThanOrEquals",
    "in",
    "hasValue",
    "node",
    "not",
    "and",
    "or",
    "xone",
    "qualifiedValueShape",
    "qualifiedMinCount",
    "qualifiedMaxCount",
    "qualifiedValueShapesDisjoint",
    "closed",
    "ignoredProperties",
    "deactivated",
    "message",
    "severity",
    "Violation",
    "Warning",
    "Info",
];

/// Owned copy of an RDF term, enough to run the structural checks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Node {
    Iri(String),
    Blank(String),
    Literal {
        value: String,
        datatype: Option<String>,
    },
    Other(String),
}

impl Node {
    fn from_subject(subject: &Subject<'_>) -> Self {
        match subject {
            Subject::NamedNode(n) => Self::Iri(n.iri.to_string()),
            Subject::BlankNode(b) => Self::Blank(b.id.to_string()),
            other => Self::Other(other.to_string()),
        }
    }

    fn from_term(term: &Term<'_>) -> Self {
        match term {
            Term::NamedNode(n) => Self::Iri(n.iri.to_string()),
            Term::BlankNode(b) => Self::Blank(b.id.to_string()),
            Term::Literal(Literal::Simple { value }) => Self::Literal {
                value: value.to_string(),
                datatype: None,
            },
            Term::Literal(Literal::LanguageTaggedString { value, .. }) => Self::Literal {
                value: value.to_string(),
                datatype: None,
            },
            Term::Literal(Literal::Typed { value, datatype }) => Self::Literal {
                value: value.to_string(),
                datatype: Some(datatype.iri.to_string()),
            },
            other => Self::Other(other.to_string()),
        }
    }

    fn is_iri(&self, iri: &str) -> bool {
        matches!(self, Self::Iri(s) if s == iri)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Iri(iri) => f.write_str(&compact(iri)),
            Self::Blank(_) => f.write_str("[]"),
            Self::Literal { value, .. } => write!(f, "{value:?}"),
            Self::Other(s) => f.write_str(s),
        }
    }
}

/// Render an IRI as `prefix:local` when it falls under a standard prefix.
fn compact(iri: &str) -> String {
    PREFIXES
        .iter()
        .find_map(|(name, ns)| iri.strip_prefix(ns).map(|local| format!("{name}:{local}")))
        .unwrap_or_else(|| format!("<{iri}>"))
}

/// Triples grouped by subject, in first-seen order.
#[derive(Default)]
struct Graph {
    subjects: Vec<Node>,
    index: HashMap<Node, usize>,
    statements: Vec<Vec<(String, Node)>>,
}

impl Graph {
    fn parse(document: &str) -> Result<Self, PipelineError> {
        let mut graph = Self::default();
        let mut parser = TurtleParser::new(document.as_bytes(), None);
        parser
            .parse_all(&mut |t: Triple<'_>| -> Result<(), TurtleError> {
                graph.insert(
                    Node::from_subject(&t.subject),
                    t.predicate.iri.to_string(),
                    Node::from_term(&t.object),
                );
                Ok(())
            })
            .map_err(|e| PipelineError::MalformedDocument {
                cause: e.to_string(),
            })?;
        Ok(graph)
    }

    fn insert(&mut self, subject: Node, predicate: String, object: Node) {
        let idx = match self.index.get(&subject) {
            Some(&idx) => idx,
            None => {
                let idx = self.subjects.len();
                self.index.insert(subject.clone(), idx);
                self.subjects.push(subject);
                self.statements.push(Vec::new());
                idx
            }
        };
        self.statements[idx].push((predicate, object));
    }

    fn objects<'a, 'p>(
        &'a self,
        subject: &Node,
        predicate: &'p str,
    ) -> impl Iterator<Item = &'a Node> + use<'a, 'p> {
        self.index
            .get(subject)
            .map(|&idx| self.statements[idx].as_slice())
            .unwrap_or_default()
            .iter()
            .filter(move |(p, _)| p == predicate)
            .map(|(_, o)| o)
    }

    fn has_type(&self, subject: &Node, class: &str) -> bool {
        self.objects(subject, RDF_TYPE).any(|o| o.is_iri(class))
    }

    fn triples(&self) -> impl Iterator<Item = (&Node, &str, &Node)> {
        self.subjects
            .iter()
            .zip(&self.statements)
            .flat_map(|(s, stmts)| stmts.iter().map(move |(p, o)| (s, p.as_str(), o)))
    }
}

fn sh(local: &str) -> String {
    format!("{SH}{local}")
}

/// Validator for Turtle SHACL documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShaclSyntaxValidator;

impl ShaclSyntaxValidator {
    fn check(&self, graph: &Graph) -> ValidationReport {
        let mut diagnostics = Vec::new();

        for (_, predicate, object) in graph.triples() {
            check_vocabulary(predicate, &mut diagnostics);
            if let Node::Iri(iri) = object {
                check_vocabulary(iri, &mut diagnostics);
            }
        }

        let node_shape = sh("NodeShape");
        let node_shapes: Vec<&Node> = graph
            .subjects
            .iter()
            .filter(|s| graph.has_type(s, &node_shape))
            .collect();
        if node_shapes.is_empty() {
            diagnostics.push("document declares no sh:NodeShape".to_string());
        }

        let targets = ["targetClass", "targetNode", "targetSubjectsOf", "targetObjectsOf"].map(sh);
        for shape in &node_shapes {
            let targeted = targets
                .iter()
                .any(|t| graph.objects(shape, t).next().is_some());
            if !targeted {
                diagnostics.push(format!("node shape {shape} has no sh:targetClass"));
            }
        }

        let property = sh("property");
        let property_shape = sh("PropertyShape");
        let mut property_shapes: Vec<&Node> = Vec::new();
        for (subject, predicate, object) in graph.triples() {
            if predicate == property && !property_shapes.contains(&object) {
                property_shapes.push(object);
            }
            if predicate == RDF_TYPE
                && object.is_iri(&property_shape)
                && !property_shapes.contains(&subject)
            {
                property_shapes.push(subject);
            }
        }
        for shape in &property_shapes {
            check_property_shape(graph, shape, &mut diagnostics);
        }

        debug!(
            "Validated document: {} node shape(s), {} property shape(s), {} diagnostic(s)",
            node_shapes.len(),
            property_shapes.len(),
            diagnostics.len()
        );

        ValidationReport {
            conforms: diagnostics.is_empty(),
            diagnostics,
            node_shapes: node_shapes.len(),
            property_shapes: property_shapes.len(),
        }
    }
}

impl ValidationOracle for ShaclSyntaxValidator {
    fn validate(&self, document: &str) -> Result<ValidationReport, PipelineError> {
        let graph = Graph::parse(document)?;
        Ok(self.check(&graph))
    }
}

fn check_vocabulary(iri: &str, diagnostics: &mut Vec<String>) {
    if let Some(local) = iri.strip_prefix(SH)
        && !SHACL_CORE.contains(&local)
    {
        let msg = format!("unknown SHACL term sh:{local}");
        if !diagnostics.contains(&msg) {
            diagnostics.push(msg);
        }
    }
}

fn check_property_shape(graph: &Graph, shape: &Node, diagnostics: &mut Vec<String>) {
    let label = property_label(graph, shape);

    match graph.objects(shape, &sh("path")).count() {
        1 => {}
        0 => diagnostics.push(format!("property shape {label} has no sh:path")),
        n => diagnostics.push(format!("property shape {label} has {n} sh:path values")),
    }

    let min = count_value(graph, shape, "minCount", &label, diagnostics);
    let max = count_value(graph, shape, "maxCount", &label, diagnostics);
    if let (Some(min), Some(max)) = (min, max)
        && min > max
    {
        diagnostics.push(format!(
            "property shape {label} has sh:minCount {min} greater than sh:maxCount {max}"
        ));
    }

    let has_datatype = graph.objects(shape, &sh("datatype")).next().is_some();
    let has_class = graph.objects(shape, &sh("class")).next().is_some();
    if has_datatype && has_class {
        diagnostics.push(format!(
            "property shape {label} declares both sh:datatype and sh:class"
        ));
    }
}

/// Identify a property shape in diagnostics by its path when it has one.
fn property_label(graph: &Graph, shape: &Node) -> String {
    match (shape, graph.objects(shape, &sh("path")).next()) {
        (Node::Blank(_), Some(path)) => format!("for {path}"),
        _ => shape.to_string(),
    }
}

/// Read `sh:<local>` as a non-negative integer, reporting bad values.
fn count_value(
    graph: &Graph,
    shape: &Node,
    local: &str,
    label: &str,
    diagnostics: &mut Vec<String>,
) -> Option<u64> {
    let value = graph.objects(shape, &sh(local)).next()?;
    let parsed = match value {
        Node::Literal { value, datatype }
            if datatype
                .as_deref()
                .is_none_or(|dt| dt.strip_prefix(XSD).is_some_and(is_integer_type)) =>
        {
            value.trim().parse::<u64>().ok()
        }
        _ => None,
    };
    if parsed.is_none() {
        diagnostics.push(format!(
            "property shape {label} has sh:{local} {value}, expected a non-negative integer"
        ));
    }
    parsed
}

fn is_integer_type(local: &str) -> bool {
    matches!(
        local,
        "integer" | "nonNegativeInteger" | "positiveInteger" | "int" | "long" | "short"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{EntityRecord, PropertyRecord};
    use crate::shapes::{normalize_document, prefix_header, render_skeleton};

    fn doc(body: &str) -> String {
        format!("{}\n{body}", prefix_header())
    }

    fn validate(body: &str) -> ValidationReport {
        ShaclSyntaxValidator.validate(&doc(body)).unwrap()
    }

    #[test]
    fn skeleton_conforms_with_expected_counts() {
        let entities = vec![
            EntityRecord::new("Car", "A vehicle"),
            EntityRecord::new("Person", "A human owner"),
        ];
        let properties = vec![
            PropertyRecord::new("Car", "name", "The name.", "Text"),
            PropertyRecord::new("Car", "owner", "The owner.", "Person"),
            PropertyRecord::new("Person", "givenName", "Given name.", "Text"),
        ];
        let report = ShaclSyntaxValidator
            .validate(&render_skeleton(&entities, &properties))
            .unwrap();
        assert!(report.conforms, "diagnostics: {:?}", report.diagnostics);
        assert_eq!(report.node_shapes, 2);
        assert_eq!(report.property_shapes, 3);
    }

    #[test]
    fn malformed_turtle_is_an_error() {
        let err = ShaclSyntaxValidator
            .validate(&doc("ex:CarShape a sh:NodeShape ; sh:targetClass"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::MalformedDocument { .. }));
    }

    #[test]
    fn undeclared_prefix_is_malformed() {
        let err = ShaclSyntaxValidator
            .validate("ex:CarShape a sh:NodeShape .")
            .unwrap_err();
        assert_eq!(err.kind(), "malformed-document");
    }

    #[test]
    fn empty_document_has_no_node_shape() {
        let report = validate("");
        assert!(!report.conforms);
        assert_eq!(report.diagnostics, ["document declares no sh:NodeShape"]);
    }

    #[test]
    fn node_shape_without_target() {
        let report = validate("ex:CarShape a sh:NodeShape .");
        assert_eq!(
            report.diagnostics,
            ["node shape ex:CarShape has no sh:targetClass"]
        );
    }

    #[test]
    fn property_shape_rules() {
        let report = validate(
            r#"
ex:CarShape a sh:NodeShape ;
    sh:targetClass schema:Car ;
    sh:property [ sh:datatype xsd:string ] ;
    sh:property [
        sh:path schema:owner ;
        sh:class schema:Person ;
        sh:datatype xsd:string ;
        sh:minCount 2 ;
        sh:maxCount 1
    ] ;
    sh:property [ sh:path schema:name ; sh:minCount "-1" ] .
"#,
        );
        assert_eq!(report.property_shapes, 3);
        assert_eq!(
            report.diagnostics,
            [
                "property shape [] has no sh:path",
                "property shape for schema:owner has sh:minCount 2 greater than sh:maxCount 1",
                "property shape for schema:owner declares both sh:datatype and sh:class",
                "property shape for schema:name has sh:minCount \"-1\", expected a non-negative integer",
            ]
        );
    }

    #[test]
    fn typed_and_plain_counts_are_read() {
        let report = validate(
            r#"
ex:CarShape a sh:NodeShape ;
    sh:targetClass schema:Car ;
    sh:property [ sh:path schema:vin ; sh:minCount 1 ; sh:maxCount "1"^^xsd:nonNegativeInteger ] ;
    sh:property [ sh:path schema:name ; sh:minCount "3"^^xsd:decimal ] .
"#,
        );
        assert_eq!(
            report.diagnostics,
            ["property shape for schema:name has sh:minCount \"3\", expected a non-negative integer"]
        );
    }

    #[test]
    fn normalized_model_output_parses() {
        let cut_off = "```turtle\n@prefix sh: <http://www.w3.org/ns/shacl#> .\nex:CarShape a sh:NodeShape ; sh:targetClass schema:Car .\n";
        let shared_line = "@prefix sh: <http://www.w3.org/ns/shacl#> . @prefix foaf: <http://xmlns.com/foaf/0.1/> .\nex:PersonShape a sh:NodeShape ; sh:targetClass foaf:Person .";
        for answer in [cut_off, shared_line] {
            let report = ShaclSyntaxValidator
                .validate(&normalize_document(answer))
                .unwrap();
            assert!(report.conforms, "diagnostics: {:?}", report.diagnostics);
            assert_eq!(report.node_shapes, 1);
        }
    }

    #[test]
    fn named_property_shapes_are_counted() {
        let report = validate(
            r#"
ex:CarShape a sh:NodeShape ; sh:targetClass schema:Car ; sh:property ex:CarName .
ex:CarName a sh:PropertyShape ; sh:path schema:name ; sh:maxCount 1 .
"#,
        );
        assert!(report.conforms, "diagnostics: {:?}", report.diagnostics);
        assert_eq!(report.property_shapes, 1);
    }

    #[test]
    fn unknown_shacl_terms_are_reported_once() {
        let report = validate(
            r#"
ex:A a sh:NodeShape ; sh:targetClass schema:Car ; sh:minCounts 1 .
ex:B a sh:NodeShape ; sh:targetClass schema:Person ; sh:minCounts 1 .
"#,
        );
        assert_eq!(report.diagnostics, ["unknown SHACL term sh:minCounts"]);
    }

    #[test]
    fn compact_uses_standard_prefixes() {
        assert_eq!(compact("https://schema.org/Car"), "schema:Car");
        assert_eq!(compact("urn:x"), "<urn:x>");
    }
}
