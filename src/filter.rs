use std::collections::{BTreeSet, HashSet};
use std::fs::File;
use std::io::Read;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::domain::{AnnotationRecord, DocumentAnnotations, PaperAnnotation};
use crate::error::CurateError;

const NOT_FOUND: &str = "NotFound";

/// Species names and NCBI taxonomy ids treated as model organisms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionSet {
    names: HashSet<String>,
    ids: HashSet<String>,
}

#[derive(Deserialize)]
struct ExclusionRow {
    species_name: String,
    #[serde(rename = "NCBI_taxonomy_id")]
    taxonomy_id: String,
}

fn usable_cell(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() || value == NOT_FOUND {
        None
    } else {
        Some(value.to_string())
    }
}

impl ExclusionSet {
    pub fn new<I, J>(names: I, ids: J) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        J: IntoIterator,
        J::Item: AsRef<str>,
    {
        Self {
            names: names.into_iter().filter_map(|n| usable_cell(n.as_ref())).collect(),
            ids: ids.into_iter().filter_map(|i| usable_cell(i.as_ref())).collect(),
        }
    }

    pub fn load(path: &Utf8Path) -> Result<Self, CurateError> {
        let file = File::open(path.as_std_path())
            .map_err(|err| CurateError::Filesystem(format!("open {path}: {err}")))?;
        let set = Self::from_reader(file)?;
        tracing::info!(
            path = %path,
            names = set.names.len(),
            ids = set.ids.len(),
            "loaded model organism list"
        );
        Ok(set)
    }

    /// Reads `species_name` and `NCBI_taxonomy_id` columns; other columns are
    /// ignored.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, CurateError> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let mut names = Vec::new();
        let mut ids = Vec::new();
        for row in csv_reader.deserialize::<ExclusionRow>() {
            let row = row.map_err(|err| CurateError::Csv(err.to_string()))?;
            names.push(row.species_name);
            ids.push(row.taxonomy_id);
        }
        Ok(Self::new(names, ids))
    }

    /// Exact match; only the loaded list is trimmed.
    pub fn excludes_name(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn excludes_id(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn excludes(&self, name: &str, id: &str) -> bool {
        self.excludes_name(name) || self.excludes_id(id)
    }

    pub fn name_count(&self) -> usize {
        self.names.len()
    }

    pub fn id_count(&self) -> usize {
        self.ids.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FilterStats {
    pub input: usize,
    pub excluded_by_name: usize,
    pub excluded_by_id: usize,
    pub excluded_by_empty_species: usize,
    pub kept: usize,
}

#[derive(Debug, Clone, Default)]
pub struct FilterOutcome {
    pub kept: Vec<AnnotationRecord>,
    pub excluded: Vec<AnnotationRecord>,
    pub stats: FilterStats,
}

/// Three ordered stages: excluded species name, then excluded species id,
/// then rows with neither a species name nor an id. `excluded` lists removed
/// records stage by stage.
pub fn filter_records(records: Vec<AnnotationRecord>, exclusion: &ExclusionSet) -> FilterOutcome {
    let mut stats = FilterStats {
        input: records.len(),
        ..FilterStats::default()
    };
    tracing::info!(
        input = stats.input,
        names = exclusion.name_count(),
        ids = exclusion.id_count(),
        "starting species exclusion"
    );

    let (by_name, rest): (Vec<_>, Vec<_>) = records
        .into_iter()
        .partition(|record| exclusion.excludes_name(&record.species_name));
    stats.excluded_by_name = by_name.len();
    tracing::info!(count = stats.excluded_by_name, "excluded by species name");

    let (by_id, rest): (Vec<_>, Vec<_>) = rest
        .into_iter()
        .partition(|record| exclusion.excludes_id(&record.species_id));
    stats.excluded_by_id = by_id.len();
    tracing::info!(count = stats.excluded_by_id, "excluded by species id");

    let (kept, empty): (Vec<_>, Vec<_>) = rest.into_iter().partition(AnnotationRecord::has_species);
    stats.excluded_by_empty_species = empty.len();
    stats.kept = kept.len();
    tracing::info!(
        count = stats.excluded_by_empty_species,
        "excluded with empty species name and id"
    );
    tracing::info!(input = stats.input, kept = stats.kept, "species exclusion finished");

    let mut excluded = by_name;
    excluded.extend(by_id);
    excluded.extend(empty);
    FilterOutcome {
        kept,
        excluded,
        stats,
    }
}

#[derive(Debug, Clone, Default)]
pub struct DocumentFilterOutcome {
    pub kept: Vec<DocumentAnnotations>,
    pub excluded_by_model_organism: Vec<DocumentAnnotations>,
    pub excluded_by_no_species: Vec<DocumentAnnotations>,
    pub excluded_by_no_genes: Vec<DocumentAnnotations>,
}

/// Drops documents mentioning any model organism, then documents without
/// species mentions, then documents without gene mentions.
pub fn filter_documents(
    documents: Vec<DocumentAnnotations>,
    exclusion: &ExclusionSet,
) -> DocumentFilterOutcome {
    let initial = documents.len();
    let (excluded_by_model_organism, rest): (Vec<_>, Vec<_>) =
        documents.into_iter().partition(|document| {
            document.species.iter().any(|species| {
                exclusion.excludes_name(&species.name)
                    || species.id.as_deref().is_some_and(|id| exclusion.excludes_id(id))
            })
        });
    let (with_species, excluded_by_no_species): (Vec<_>, Vec<_>) = rest
        .into_iter()
        .partition(|document| !document.species.is_empty());
    let (kept, excluded_by_no_genes): (Vec<_>, Vec<_>) = with_species
        .into_iter()
        .partition(|document| !document.genes.is_empty());

    tracing::info!(
        initial,
        model_organism = excluded_by_model_organism.len(),
        no_species = excluded_by_no_species.len(),
        no_genes = excluded_by_no_genes.len(),
        kept = kept.len(),
        "document filter finished"
    );

    DocumentFilterOutcome {
        kept,
        excluded_by_model_organism,
        excluded_by_no_species,
        excluded_by_no_genes,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnnotationSummary {
    pub total_pmids: usize,
    pub pmids_with_species: usize,
    pub pmids_with_genes: usize,
    pub pmids_with_both: usize,
    pub total_species_annotations: usize,
    pub total_gene_annotations: usize,
    pub avg_species_per_pmid: f64,
    pub avg_genes_per_pmid: f64,
    pub unique_species: Vec<String>,
    pub unique_genes: Vec<String>,
    pub unique_species_count: usize,
    pub unique_genes_count: usize,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn summarize(documents: &[DocumentAnnotations]) -> AnnotationSummary {
    let mut summary = AnnotationSummary {
        total_pmids: documents.len(),
        ..AnnotationSummary::default()
    };
    let mut unique_species = BTreeSet::new();
    let mut unique_genes = BTreeSet::new();

    for document in documents {
        let has_species = !document.species.is_empty();
        let has_genes = !document.genes.is_empty();
        if has_species {
            summary.pmids_with_species += 1;
            summary.total_species_annotations += document.species.len();
        }
        if has_genes {
            summary.pmids_with_genes += 1;
            summary.total_gene_annotations += document.genes.len();
        }
        if has_species && has_genes {
            summary.pmids_with_both += 1;
        }
        unique_species.extend(
            document
                .species
                .iter()
                .filter(|m| !m.name.is_empty())
                .map(|m| m.name.clone()),
        );
        unique_genes.extend(
            document
                .genes
                .iter()
                .filter(|m| !m.name.is_empty())
                .map(|m| m.name.clone()),
        );
    }

    if summary.total_pmids > 0 {
        let total = summary.total_pmids as f64;
        summary.avg_species_per_pmid = round2(summary.total_species_annotations as f64 / total);
        summary.avg_genes_per_pmid = round2(summary.total_gene_annotations as f64 / total);
    }
    summary.unique_species = unique_species.into_iter().collect();
    summary.unique_genes = unique_genes.into_iter().collect();
    summary.unique_species_count = summary.unique_species.len();
    summary.unique_genes_count = summary.unique_genes.len();
    summary
}

#[derive(Debug, Clone, Default)]
pub struct PaperFilterOutcome {
    pub kept: Vec<PaperAnnotation>,
    pub excluded_by_model_organism: Vec<PaperAnnotation>,
    pub excluded_by_no_gene: Vec<PaperAnnotation>,
}

/// Filters stored paper annotations: any entry naming a model organism (by
/// name or id) excludes the paper, and at least one entry must carry a gene.
pub fn filter_papers(papers: Vec<PaperAnnotation>, exclusion: &ExclusionSet) -> PaperFilterOutcome {
    let (excluded_by_model_organism, rest): (Vec<_>, Vec<_>) =
        papers.into_iter().partition(|paper| {
            paper
                .species_gene_list
                .iter()
                .any(|entry| exclusion.excludes(&entry.species_name, &entry.species_id))
        });
    let (kept, excluded_by_no_gene): (Vec<_>, Vec<_>) =
        rest.into_iter().partition(PaperAnnotation::has_gene);
    PaperFilterOutcome {
        kept,
        excluded_by_model_organism,
        excluded_by_no_gene,
    }
}
