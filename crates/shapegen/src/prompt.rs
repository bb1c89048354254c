//! Prompt rendering for the three phases.
//!
//! [`build`] is pure: the same phase and context always render the same
//! prompt. Prompts are assembled from `## Section` blocks with
//! [`PromptBuilder`], which skips empty sections, so an absent feedback note
//! leaves no trace in the prompt.

use crate::PipelineError;
use crate::pipeline::PipelinePhase;
use crate::records::{EntityRecord, PropertyRecord, format_entities, format_properties};
use crate::shapes::{prefix_header, render_skeleton};

/// A user note plus the answer it refers to.
///
/// The completion oracle is stateless, so a revision prompt has to carry the
/// previous answer along with the note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Feedback {
    pub note: String,
    pub previous_output: String,
}

/// Everything a phase prompt may draw on.
#[derive(Debug, Clone, Copy, Default)]
pub struct PhaseContext<'a> {
    pub use_case: &'a str,
    pub entities: &'a [EntityRecord],
    pub properties: &'a [PropertyRecord],
    pub feedback: Option<&'a Feedback>,
}

/// Builder for multi-section prompts. Sections are joined with blank lines;
/// empty sections are skipped.
pub struct PromptBuilder {
    sections: Vec<String>,
}

impl PromptBuilder {
    pub fn new(preamble: impl Into<String>) -> Self {
        Self {
            sections: vec![preamble.into()],
        }
    }

    /// Append a `## heading` section. Skipped if `content` is empty.
    pub fn section(mut self, heading: &str, content: impl Into<String>) -> Self {
        let content = content.into();
        if !content.trim().is_empty() {
            self.sections.push(format!("## {heading}\n\n{}", content.trim_end()));
        }
        self
    }

    /// Append a section only if the content is `Some`.
    pub fn section_opt(self, heading: &str, content: Option<impl Into<String>>) -> Self {
        match content {
            Some(c) => self.section(heading, c),
            None => self,
        }
    }

    /// Append raw text without a heading. Skipped if empty.
    pub fn raw(mut self, content: impl Into<String>) -> Self {
        let content = content.into();
        if !content.trim().is_empty() {
            self.sections.push(content);
        }
        self
    }

    pub fn build(self) -> String {
        self.sections.join("\n\n")
    }
}

const SCHEMA_SOURCE: &str = "https://schema.org/version/latest/schemaorg-current-https.ttl";

const ENTITY_GUIDANCE: &str = "\
- Always pick the most specific fitting class. A BMW or a Mercedes is a Car, not a Vehicle \
and not an Automotive (which does not exist). Europe is a Continent, not a Place.
- Name the overarching concept, not the individual: \"I\" and \"employees\" are both Person.
- If a concept occurs several times (two different companies), list its class only once.
- The description is the exact rdfs:comment of the class on schema.org.";

const ENTITY_EXAMPLE: &str = "\
Use case: \"I have the company Amazon which has 50 employees. These employees should own \
BMWs. These cars must in turn be manufactured by company AB.\"

Car|A car is a wheeled, self-powered motor vehicle used for transportation.
Organization|An organization such as a school, NGO, corporation, club, etc.
Person|A person (alive, dead, undead, or fictional).";

const PROPERTY_GUIDANCE: &str = "\
- Only use properties that schema.org defines for that exact class. Do not borrow a \
property from a different class.
- Only include properties that can be concluded from the use case, abstracted to the \
closest schema.org property.
- If the use case says nothing about an entity, give the most basic identifying property \
(name or identifier).
- The expected type is the schema.org \"Expected Type\": Text, Number, Integer, Boolean, \
Date, DateTime, URL, or a class such as Organization.";

const PROPERTY_EXAMPLE: &str = "\
Person|givenName|Given name. In the U.S., the first name of a Person.|Text
Person|birthDate|Date of birth.|Date
Person|owns|Products owned by the organization or person.|Product
Organization|employee|Someone working for this organization.|Person
Car|manufacturer|The manufacturer of the product.|Organization";

const DOCUMENT_GUIDANCE: &str = "\
- One NodeShape per entity, named ex:<Entity>Shape, with sh:targetClass schema:<Entity>.
- One sh:property [ ... ] block per property with sh:path schema:<property>, sh:name and \
sh:description.
- Literal types use sh:datatype (xsd:string, xsd:date, xsd:decimal, ...); class-valued \
properties use sh:class schema:<Class>. Never both.
- Add sh:minCount / sh:maxCount where the use case implies cardinality. Counts are \
non-negative integers and sh:minCount never exceeds sh:maxCount.
- Declare any prefix you use beyond the standard ones.";

fn format_instruction(line_format: &str) -> String {
    format!(
        "Answer only with the list, one record per line, in the format `{line_format}`. \
No numbering, no bold text, no headings, no comments of your own."
    )
}

fn feedback_sections(builder: PromptBuilder, feedback: Option<&Feedback>) -> PromptBuilder {
    match feedback {
        Some(fb) => builder
            .section("Your Previous Answer", fb.previous_output.clone())
            .section(
                "Feedback",
                format!(
                    "{}\n\nRevise your previous answer according to this feedback. \
Keep everything the feedback does not ask to change.",
                    fb.note.trim()
                ),
            ),
        None => builder,
    }
}

fn require_use_case(ctx: &PhaseContext<'_>) -> Result<(), PipelineError> {
    if ctx.use_case.trim().is_empty() {
        return Err(PipelineError::InvalidPhaseContext("use case is empty".into()));
    }
    Ok(())
}

fn require_entities(ctx: &PhaseContext<'_>) -> Result<(), PipelineError> {
    if ctx.entities.is_empty() {
        return Err(PipelineError::InvalidPhaseContext("entity list is empty".into()));
    }
    Ok(())
}

fn require_properties(ctx: &PhaseContext<'_>) -> Result<(), PipelineError> {
    if ctx.properties.is_empty() {
        return Err(PipelineError::InvalidPhaseContext("property list is empty".into()));
    }
    Ok(())
}

/// Render the prompt for `phase` from `ctx`.
///
/// Fails with [`PipelineError::InvalidPhaseContext`] when the context lacks
/// what the phase needs: a use case for entity extraction, entities for
/// property extraction, entities and properties for document generation.
pub fn build(phase: PipelinePhase, ctx: &PhaseContext<'_>) -> Result<String, PipelineError> {
    match phase {
        PipelinePhase::EntityExtraction => entity_prompt(ctx),
        PipelinePhase::PropertyExtraction => property_prompt(ctx),
        PipelinePhase::DocumentGeneration => document_prompt(ctx),
    }
}

fn entity_prompt(ctx: &PhaseContext<'_>) -> Result<String, PipelineError> {
    require_use_case(ctx)?;
    let builder = PromptBuilder::new(format!(
        "Extract every concept from the use case below that matches a class in the \
schema.org vocabulary ({SCHEMA_SOURCE})."
    ))
    .section("Rules", ENTITY_GUIDANCE)
    .section("Output Format", format_instruction("ClassName|Description"))
    .section("Example", ENTITY_EXAMPLE)
    .section("Use Case", ctx.use_case.trim());
    Ok(feedback_sections(builder, ctx.feedback).build())
}

fn property_prompt(ctx: &PhaseContext<'_>) -> Result<String, PipelineError> {
    require_entities(ctx)?;
    let builder = PromptBuilder::new(
        "For each of the schema.org classes below, list the properties the use case needs, \
taken from the schema.org page of that class, without fetching any URL.",
    )
    .section_opt(
        "Use Case",
        Some(ctx.use_case.trim()).filter(|u| !u.is_empty()),
    )
    .section("Entities", format_entities(ctx.entities))
    .section("Rules", PROPERTY_GUIDANCE)
    .section(
        "Output Format",
        format_instruction("Entity|property|description|ExpectedType"),
    )
    .section("Example", PROPERTY_EXAMPLE);
    Ok(feedback_sections(builder, ctx.feedback).build())
}

fn document_prompt(ctx: &PhaseContext<'_>) -> Result<String, PipelineError> {
    require_entities(ctx)?;
    require_properties(ctx)?;
    let builder = PromptBuilder::new(
        "Generate a SHACL document in Turtle syntax for the schema.org types and properties below.",
    )
    .section("Entities", format_entities(ctx.entities))
    .section("Properties", format_properties(ctx.properties))
    .section("Requirements", DOCUMENT_GUIDANCE)
    .section(
        "Prefixes",
        format!("Start the document with exactly these prefixes:\n\n{}", prefix_header()),
    )
    .section(
        "Starting Template",
        format!(
            "Refine this template. Correct datatypes and classes so they match schema.org \
and adjust cardinalities to the use case.\n\n```turtle\n{}```",
            render_skeleton(ctx.entities, ctx.properties)
        ),
    )
    .section(
        "Output Format",
        "Answer with the complete document in a single ```turtle code block.",
    );
    Ok(feedback_sections(builder, ctx.feedback).build())
}
