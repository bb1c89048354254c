//! Entity and property records, and the strict parser for model output.
//!
//! Phases 1 and 2 ask the model to answer with one record per line, fields
//! separated by `|`:
//!
//! ```text
//! Car|A car is a wheeled, self-powered motor vehicle used for transportation.
//! Person|A person (alive, dead, undead, or fictional).
//! ```
//!
//! ```text
//! Person|givenName|Given name. In the U.S., the first name of a Person.|Text
//! Car|manufacturer|The manufacturer of the product.|Organization
//! ```
//!
//! Grammar, per line after trimming:
//!
//! - empty lines and lines starting with `#` are ignored;
//! - a line starting with three backticks (a markdown fence) is ignored;
//! - anything else must be a record with exactly the expected number of
//!   fields, every field non-empty, names matching `[A-Za-z_][A-Za-z0-9_]*`.
//!
//! Any other shape is a [`PipelineError::Parse`] carrying the 1-based line
//! number. An answer with no records at all is also a parse error.

use serde::{Deserialize, Serialize};

use crate::PipelineError;

/// Field separator in record lines.
pub const FIELD_SEPARATOR: char = '|';

/// A domain concept mapped to a schema.org class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub name: String,
    pub description: String,
}

impl EntityRecord {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }

    /// Render as a grammar line (`Name|Description`).
    pub fn to_line(&self) -> String {
        format!("{}{FIELD_SEPARATOR}{}", self.name, self.description)
    }
}

/// An attribute or relationship of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyRecord {
    /// Name of the owning [`EntityRecord`].
    pub entity: String,
    pub name: String,
    pub description: String,
    /// Expected type hint, e.g. `Text`, `Date`, or a class like `Organization`.
    pub range: String,
}

impl PropertyRecord {
    pub fn new(
        entity: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        range: impl Into<String>,
    ) -> Self {
        Self {
            entity: entity.into(),
            name: name.into(),
            description: description.into(),
            range: range.into(),
        }
    }

    /// Render as a grammar line (`Entity|property|description|Range`).
    pub fn to_line(&self) -> String {
        let sep = FIELD_SEPARATOR;
        format!(
            "{}{sep}{}{sep}{}{sep}{}",
            self.entity, self.name, self.description, self.range
        )
    }
}

/// Whether `s` is a valid record name (`[A-Za-z_][A-Za-z0-9_]*`).
pub fn is_valid_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Iterate over the record-bearing lines of a completion as
/// `(line_number, trimmed_line)`.
fn record_lines(text: &str) -> impl Iterator<Item = (usize, &str)> {
    text.lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#') && !line.starts_with("```"))
}

/// Split a line into exactly `expected` trimmed, non-empty fields.
fn split_fields(line_no: usize, line: &str, expected: usize) -> Result<Vec<&str>, PipelineError> {
    let fields: Vec<&str> = line.split(FIELD_SEPARATOR).map(str::trim).collect();
    if fields.len() != expected {
        return Err(PipelineError::parse(
            line_no,
            format!(
                "expected {expected} '{FIELD_SEPARATOR}'-separated fields, found {}: {line:?}",
                fields.len()
            ),
        ));
    }
    if let Some(pos) = fields.iter().position(|f| f.is_empty()) {
        return Err(PipelineError::parse(
            line_no,
            format!("field {} is empty", pos + 1),
        ));
    }
    Ok(fields)
}

fn check_name(line_no: usize, what: &str, name: &str) -> Result<(), PipelineError> {
    if is_valid_name(name) {
        Ok(())
    } else {
        Err(PipelineError::parse(
            line_no,
            format!("{what} {name:?} is not a valid identifier"),
        ))
    }
}

/// Parse a phase-1 completion into entity records, in answer order.
pub fn parse_entities(text: &str) -> Result<Vec<EntityRecord>, PipelineError> {
    let mut entities = Vec::new();
    for (line_no, line) in record_lines(text) {
        let fields = split_fields(line_no, line, 2)?;
        check_name(line_no, "entity name", fields[0])?;
        entities.push(EntityRecord::new(fields[0], fields[1]));
    }
    if entities.is_empty() {
        return Err(PipelineError::parse(0, "no entity records found"));
    }
    Ok(entities)
}

/// Parse a phase-2 completion into property records.
///
/// Every record must reference one of `entities` by name.
pub fn parse_properties(
    text: &str,
    entities: &[EntityRecord],
) -> Result<Vec<PropertyRecord>, PipelineError> {
    let mut properties = Vec::new();
    for (line_no, line) in record_lines(text) {
        let fields = split_fields(line_no, line, 4)?;
        check_name(line_no, "entity name", fields[0])?;
        check_name(line_no, "property name", fields[1])?;
        if !entities.iter().any(|e| e.name == fields[0]) {
            return Err(PipelineError::parse(
                line_no,
                format!("property {:?} references unknown entity {:?}", fields[1], fields[0]),
            ));
        }
        properties.push(PropertyRecord::new(
            fields[0], fields[1], fields[2], fields[3],
        ));
    }
    if properties.is_empty() {
        return Err(PipelineError::parse(0, "no property records found"));
    }
    Ok(properties)
}

/// Render entities back into the grammar, one per line.
pub fn format_entities(entities: &[EntityRecord]) -> String {
    entities
        .iter()
        .map(EntityRecord::to_line)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render properties back into the grammar, one per line.
pub fn format_properties(properties: &[PropertyRecord]) -> String {
    properties
        .iter()
        .map(PropertyRecord::to_line)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Properties that belong to `entity`, in answer order.
pub fn properties_of<'a>(
    properties: &'a [PropertyRecord],
    entity: &'a str,
) -> impl Iterator<Item = &'a PropertyRecord> {
    properties.iter().filter(move |p| p.entity == entity)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn car_and_person() -> Vec<EntityRecord> {
        vec![
            EntityRecord::new("Car", "A vehicle"),
            EntityRecord::new("Person", "A human owner"),
        ]
    }

    #[test]
    fn parses_two_entities_in_order() {
        let entities = parse_entities("Car|A vehicle\nPerson|A human owner").unwrap();
        assert_eq!(entities, car_and_person());
    }

    #[test]
    fn ignores_blank_comment_and_fence_lines() {
        let text = "```text\n# entities\n\n  Car | A vehicle  \n```\n";
        let entities = parse_entities(text).unwrap();
        assert_eq!(entities, vec![EntityRecord::new("Car", "A vehicle")]);
    }

    #[test]
    fn rejects_prose() {
        let err = parse_entities("Sure! Here are the entities:\nCar|A vehicle").unwrap_err();
        match err {
            PipelineError::Parse { line, .. } => assert_eq!(line, 1),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_extra_fields() {
        let err = parse_entities("Car|A vehicle|extra").unwrap_err();
        assert!(err.to_string().contains("expected 2"));
    }

    #[test]
    fn rejects_empty_description() {
        let err = parse_entities("Car|").unwrap_err();
        assert!(err.to_string().contains("field 2 is empty"));
    }

    #[test]
    fn rejects_invalid_entity_name() {
        assert!(parse_entities("Motor Car|A vehicle").is_err());
        assert!(parse_entities("9Car|A vehicle").is_err());
    }

    #[test]
    fn empty_answer_is_parse_error() {
        assert!(matches!(
            parse_entities("\n\n"),
            Err(PipelineError::Parse { line: 0, .. })
        ));
    }

    #[test]
    fn parses_properties() {
        let text = "Car|name|The name of the item.|Text\nCar|owner|Who owns it.|Person";
        let props = parse_properties(text, &car_and_person()).unwrap();
        assert_eq!(props.len(), 2);
        assert_eq!(props[1], PropertyRecord::new("Car", "owner", "Who owns it.", "Person"));
    }

    #[test]
    fn property_must_reference_known_entity() {
        let err = parse_properties("Boat|name|Name.|Text", &car_and_person()).unwrap_err();
        assert!(err.to_string().contains("unknown entity \"Boat\""));
    }

    #[test]
    fn format_round_trips_through_parser() {
        let entities = car_and_person();
        assert_eq!(parse_entities(&format_entities(&entities)).unwrap(), entities);
    }

    #[test]
    fn properties_of_filters_by_entity() {
        let props = vec![
            PropertyRecord::new("Car", "name", "n", "Text"),
            PropertyRecord::new("Person", "givenName", "g", "Text"),
            PropertyRecord::new("Car", "owner", "o", "Person"),
        ];
        let names: Vec<&str> = properties_of(&props, "Car").map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["name", "owner"]);
    }

    #[test]
    fn name_validation() {
        assert!(is_valid_name("MonetaryAmount"));
        assert!(is_valid_name("_x1"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("a-b"));
    }
}
