//! Taxonomy and gene lookups against NCBI E-utilities.
//!
//! Every operation here is best-effort: failures are logged and surface as
//! empty fields, never as errors.

use std::thread;
use std::time::Duration;

use serde::Serialize;

use crate::domain::{GeneMode, TaxonomyMode};
use crate::error::CurateError;
use crate::ncbi::{NcbiClient, SearchQuery};
use crate::pubmed::parse_id_list;
use crate::xml::{self, Element};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaxonomyInfo {
    pub species_name: String,
    #[serde(rename = "class")]
    pub class_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TaxonomyResult {
    TaxonomyId(String),
    Info(TaxonomyInfo),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GeneInfo {
    pub gene_id: String,
    pub gene_name: String,
    pub description: String,
    pub ensembl_id: String,
    pub synonyms: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpeciesSummary {
    pub taxonomy_id: String,
    pub scientific_name: Option<String>,
    pub common_name: Option<String>,
}

pub struct LookupClient<N: NcbiClient> {
    ncbi: N,
    pace: Duration,
}

fn is_all_digits(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|ch| ch.is_ascii_digit())
}

impl<N: NcbiClient> LookupClient<N> {
    pub fn new(ncbi: N) -> Self {
        Self {
            ncbi,
            pace: Duration::ZERO,
        }
    }

    /// Delay inserted between the two calls of [`Self::summarize_species`].
    pub fn with_pace(mut self, pace: Duration) -> Self {
        self.pace = pace;
        self
    }

    pub fn resolve_taxonomy(&self, query: &str, mode: TaxonomyMode) -> TaxonomyResult {
        let query = query.trim();
        let mode = match mode {
            TaxonomyMode::Auto if is_all_digits(query) => TaxonomyMode::IdToName,
            TaxonomyMode::Auto => TaxonomyMode::NameToId,
            other => other,
        };
        match mode {
            TaxonomyMode::IdToName => TaxonomyResult::Info(self.taxonomy_info(query)),
            _ => TaxonomyResult::TaxonomyId(self.taxonomy_id(query)),
        }
    }

    /// First taxonomy id matching `species_name`, or empty.
    pub fn taxonomy_id(&self, species_name: &str) -> String {
        let query = SearchQuery::new("taxonomy", species_name);
        match self.first_search_hit(&query) {
            Ok(id) => id,
            Err(err) => {
                tracing::error!(species = species_name, error = %err, "taxonomy search failed");
                String::new()
            }
        }
    }

    /// Scientific name and lineage class for a taxonomy id.
    pub fn taxonomy_info(&self, taxonomy_id: &str) -> TaxonomyInfo {
        let ids = vec![taxonomy_id.to_string()];
        let result = self
            .ncbi
            .efetch("taxonomy", &ids)
            .and_then(|body| parse_taxonomy_info(&body));
        match result {
            Ok(info) => info,
            Err(err) => {
                tracing::error!(taxonomy_id, error = %err, "taxonomy fetch failed");
                TaxonomyInfo::default()
            }
        }
    }

    pub fn resolve_gene(&self, query: &str, mode: GeneMode, species_id: Option<&str>) -> GeneInfo {
        let query = query.trim();
        let species_id = species_id.map(str::trim).filter(|value| !value.is_empty());
        let mode = match mode {
            GeneMode::Auto if is_all_digits(query) => GeneMode::IdToInfo,
            GeneMode::Auto if species_id.is_some() => GeneMode::SpeciesAndNameToId,
            GeneMode::Auto => {
                tracing::error!(query, "gene lookup needs a gene id or a species id");
                return GeneInfo::default();
            }
            other => other,
        };

        match mode {
            GeneMode::IdToInfo => self.gene_info(query),
            GeneMode::IdToName => {
                let info = self.gene_info(query);
                GeneInfo {
                    gene_id: query.to_string(),
                    gene_name: info.gene_name,
                    ..GeneInfo::default()
                }
            }
            _ => {
                let Some(species_id) = species_id else {
                    tracing::error!(query, "species id required to resolve a gene name");
                    return GeneInfo::default();
                };
                let gene_id = self.gene_id(species_id, query);
                if gene_id.is_empty() {
                    return GeneInfo::default();
                }
                self.gene_info(&gene_id)
            }
        }
    }

    /// First gene id for `gene_name` within taxon `species_id`, or empty.
    pub fn gene_id(&self, species_id: &str, gene_name: &str) -> String {
        let term = format!("{gene_name}[Gene Name] AND txid{species_id}[Organism]");
        let query = SearchQuery::new("gene", term);
        match self.first_search_hit(&query) {
            Ok(id) => id,
            Err(err) => {
                tracing::error!(gene = gene_name, species_id, error = %err, "gene search failed");
                String::new()
            }
        }
    }

    pub fn gene_info(&self, gene_id: &str) -> GeneInfo {
        let ids = vec![gene_id.to_string()];
        let result = self
            .ncbi
            .efetch("gene", &ids)
            .and_then(|body| parse_gene_info(&body));
        match result {
            Ok(info) => {
                tracing::info!(
                    gene_id,
                    locus = %info.gene_name,
                    ensembl = %info.ensembl_id,
                    synonyms = info.synonyms.len(),
                    "gene info"
                );
                GeneInfo {
                    gene_id: gene_id.to_string(),
                    ..info
                }
            }
            Err(err) => {
                tracing::error!(gene_id, error = %err, "gene fetch failed");
                GeneInfo {
                    gene_id: gene_id.to_string(),
                    ..GeneInfo::default()
                }
            }
        }
    }

    /// Taxonomy id plus scientific and common names for a free-text organism
    /// name. `None` when the search finds nothing or fails.
    pub fn summarize_species(&self, organism_name: &str) -> Option<SpeciesSummary> {
        let query = SearchQuery::new("taxonomy", organism_name);
        let taxonomy_id = match self.first_search_hit(&query) {
            Ok(id) if !id.is_empty() => id,
            Ok(_) => {
                tracing::warn!(organism = organism_name, "no taxonomy id found");
                return None;
            }
            Err(err) => {
                tracing::error!(organism = organism_name, error = %err, "taxonomy search failed");
                return None;
            }
        };

        if !self.pace.is_zero() {
            thread::sleep(self.pace);
        }

        let summary = self
            .ncbi
            .esummary("taxonomy", &taxonomy_id)
            .and_then(|body| xml::parse(&body));
        match summary {
            Ok(root) => {
                let scientific_name = summary_item(&root, "ScientificName");
                let common_name = summary_item(&root, "CommonName");
                tracing::info!(
                    organism = organism_name,
                    taxonomy_id = %taxonomy_id,
                    scientific = ?scientific_name,
                    common = ?common_name,
                    "resolved organism"
                );
                Some(SpeciesSummary {
                    taxonomy_id,
                    scientific_name,
                    common_name,
                })
            }
            Err(err) => {
                tracing::error!(organism = organism_name, error = %err, "taxonomy summary failed");
                None
            }
        }
    }

    fn first_search_hit(&self, query: &SearchQuery) -> Result<String, CurateError> {
        let body = self.ncbi.esearch(query)?;
        Ok(parse_id_list(&body)?.into_iter().next().unwrap_or_default())
    }
}

fn summary_item(root: &Element, name: &str) -> Option<String> {
    root.iter()
        .into_iter()
        .find(|e| e.name == "Item" && e.attr("Name") == Some(name))
        .map(Element::text)
        .filter(|text| !text.is_empty())
}

pub fn parse_taxonomy_info(xml: &str) -> Result<TaxonomyInfo, CurateError> {
    let root = xml::parse(xml)?;
    let species_name = root.find_text("Taxon/ScientificName");
    let class_name = root
        .find_all("Taxon/LineageEx/Taxon")
        .into_iter()
        .find(|taxon| taxon.find_text("Rank") == "class")
        .map(|taxon| taxon.find_text("ScientificName"))
        .unwrap_or_default();
    Ok(TaxonomyInfo {
        species_name,
        class_name,
    })
}

/// Gene record fields located by tag substring anywhere in an Entrezgene
/// document.
pub fn parse_gene_info(xml: &str) -> Result<GeneInfo, CurateError> {
    let root = xml::parse(xml)?;
    let elements = root.iter();

    let first_text = |tag: &str| {
        elements
            .iter()
            .filter(|e| e.name.contains(tag))
            .map(|e| e.text())
            .find(|text| !text.is_empty())
            .unwrap_or_default()
    };
    let gene_name = first_text("Gene-ref_locus");
    let description = first_text("Gene-ref_desc");

    let mut synonyms: Vec<String> = Vec::new();
    for element in elements.iter().filter(|e| e.name.contains("Gene-ref_syn_E")) {
        let text = element.text();
        if !text.is_empty() && !synonyms.contains(&text) {
            synonyms.push(text);
        }
    }

    let ensembl_id = elements
        .iter()
        .filter(|parent| {
            parent
                .elements()
                .any(|child| child.name.contains("Dbtag_db") && child.text() == "Ensembl")
        })
        .find_map(|parent| {
            parent
                .descendants()
                .into_iter()
                .find(|e| e.name.contains("Dbtag_tag"))
                .and_then(|tag| {
                    tag.descendants()
                        .into_iter()
                        .filter(|e| e.name.contains("Object-id_str"))
                        .map(Element::text)
                        .find(|text| !text.is_empty())
                })
        })
        .unwrap_or_default();

    Ok(GeneInfo {
        gene_id: String::new(),
        gene_name,
        description,
        ensembl_id,
        synonyms,
    })
}
