use std::io::Write;
use std::process::{Command, Stdio};
use std::thread;

use serde::{Deserialize, Serialize};

use crate::domain::{AnnotationRecord, SpeciesGeneEntry};
use crate::error::CurateError;

pub const RESEARCH_CATEGORIES: [&str; 5] = [
    "Gene Identification Analysis",
    "Functional Annotation",
    "Gene Expression Analysis",
    "Phylogenetic and Evolutionary Analysis",
    "Functional Validation",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
    pub calls: u64,
}

impl TokenUsage {
    pub fn accumulate(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.cost += other.cost;
        self.calls += other.calls;
    }

    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeciesVerdict {
    pub species_name: String,
    pub species_id: String,
    pub species_class: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneVerdict {
    pub gene_name: String,
    pub gene_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentVerdict {
    pub species: Vec<SpeciesVerdict>,
    pub genes: Vec<GeneVerdict>,
    #[serde(alias = "gene_research_type")]
    pub gene_research_types: Vec<String>,
}

/// What one agent run produced: its log lines, the structured verdict when it
/// reached one, and token accounting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentReply {
    pub transcript: Vec<String>,
    pub verdict: Option<AgentVerdict>,
    pub usage: TokenUsage,
}

pub trait AnnotationAgent {
    fn annotate(&self, prompt: &str) -> Result<AgentReply, CurateError>;
}

/// Runs an external program per paper: prompt on stdin, `AgentReply` JSON on
/// stdout. Its stderr passes through.
#[derive(Debug, Clone)]
pub struct CommandAgent {
    program: String,
    args: Vec<String>,
}

impl CommandAgent {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

impl AnnotationAgent for CommandAgent {
    fn annotate(&self, prompt: &str) -> Result<AgentReply, CurateError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|err| CurateError::Agent(format!("spawn {}: {err}", self.program)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| CurateError::Agent("agent stdin unavailable".to_string()))?;
        let input = prompt.to_string();
        let feeder = thread::spawn(move || stdin.write_all(input.as_bytes()));

        let output = child
            .wait_with_output()
            .map_err(|err| CurateError::Agent(err.to_string()))?;
        match feeder.join() {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::debug!(error = %err, "agent closed stdin early"),
            Err(_) => return Err(CurateError::Agent("stdin writer panicked".to_string())),
        }

        if !output.status.success() {
            return Err(CurateError::Agent(format!(
                "{} exited with {}",
                self.program, output.status
            )));
        }
        serde_json::from_slice(&output.stdout)
            .map_err(|err| CurateError::Agent(format!("invalid agent reply: {err}")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptVariant {
    /// The agent may call taxonomy and gene lookup tools.
    ToolAugmented,
    Plain,
}

pub fn render_prompt(record: &AnnotationRecord, variant: PromptVariant) -> String {
    let validation = match variant {
        PromptVariant::ToolAugmented => {
            "Validate each gene with the gene lookup tool (name, id and species must agree) \
             and fetch the taxonomic class of each species with the taxonomy lookup tool."
        }
        PromptVariant::Plain => {
            "Check that each gene name, gene id and species agree, and give the taxonomic \
             class of each species."
        }
    };
    let categories = RESEARCH_CATEGORIES
        .iter()
        .map(|category| format!("  - {category}"))
        .collect::<Vec<_>>()
        .join("\n");
    let text = |value: &Option<String>| value.clone().unwrap_or_default();

    format!(
        "Curate one paper for a non-model organism gene study.\n\
         \n\
         PMID: {pmid}\n\
         PubTator species hint: {species_name} (taxonomy id: {species_id})\n\
         PubTator gene hint: {gene_name} (gene id: {gene_id})\n\
         Title: {title}\n\
         Abstract: {abstract_text}\n\
         MeSH: {mesh}\n\
         \n\
         1. List every species and every gene the title, abstract and MeSH terms \
         mention. Treat the PubTator hints as hints only.\n\
         2. {validation}\n\
         3. Choose every research category that applies:\n\
         {categories}\n\
         \n\
         Reply with species (species_name, species_id, species_class), genes \
         (gene_name, gene_id) and gene_research_types. Leave unknown fields empty.\n",
        pmid = record.pmid,
        species_name = record.species_name,
        species_id = record.species_id,
        gene_name = record.gene_name,
        gene_id = record.gene_id,
        title = text(&record.title),
        abstract_text = text(&record.abstract_text),
        mesh = text(&record.mesh),
    )
}

fn distinct<T: PartialEq + Clone>(items: &[T]) -> Vec<T> {
    let mut unique: Vec<T> = Vec::new();
    for item in items {
        if !unique.contains(item) {
            unique.push(item.clone());
        }
    }
    unique
}

/// Cartesian product of distinct species and distinct genes. Missing sides
/// become empty fields, so the list always has at least one entry.
pub fn build_species_gene_list(
    species: &[SpeciesVerdict],
    genes: &[GeneVerdict],
) -> Vec<SpeciesGeneEntry> {
    let species = distinct(species);
    let genes = distinct(genes);
    let species = if species.is_empty() {
        vec![SpeciesVerdict::default()]
    } else {
        species
    };
    let genes = if genes.is_empty() {
        vec![GeneVerdict::default()]
    } else {
        genes
    };

    let mut entries = Vec::with_capacity(species.len() * genes.len());
    for organism in &species {
        for gene in &genes {
            entries.push(SpeciesGeneEntry {
                species_name: organism.species_name.clone(),
                species_id: organism.species_id.clone(),
                species_class: organism.species_class.clone(),
                gene_name: gene.gene_name.clone(),
                gene_id: gene.gene_id.clone(),
            });
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reply_fields_default_when_missing() {
        let reply: AgentReply = serde_json::from_str(r#"{"transcript": ["step"]}"#).unwrap();
        assert_eq!(reply.transcript, vec!["step"]);
        assert!(reply.verdict.is_none());
        assert_eq!(reply.usage, TokenUsage::default());
    }

    #[test]
    fn usage_accumulates() {
        let mut total = TokenUsage::default();
        total.accumulate(&TokenUsage {
            input_tokens: 10,
            output_tokens: 5,
            cost: 0.25,
            calls: 2,
        });
        total.accumulate(&TokenUsage {
            input_tokens: 1,
            output_tokens: 1,
            cost: 0.25,
            calls: 1,
        });
        assert_eq!(total.total_tokens(), 17);
        assert_eq!(total.calls, 3);
        assert!((total.cost - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn duplicate_species_collapse() {
        let species = vec![
            SpeciesVerdict {
                species_name: "Danio rerio".to_string(),
                ..SpeciesVerdict::default()
            };
            2
        ];
        let list = build_species_gene_list(&species, &[]);
        assert_eq!(list.len(), 1);
    }
}
