use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveDate};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::CurateError;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pmid(String);

impl Pmid {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Pmid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Pmid {
    type Err = CurateError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        let is_valid = !normalized.is_empty() && normalized.chars().all(|ch| ch.is_ascii_digit());
        if !is_valid {
            return Err(CurateError::InvalidPmid(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

impl TryFrom<String> for Pmid {
    type Error = CurateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Pmid> for String {
    fn from(value: Pmid) -> Self {
        value.0
    }
}

/// One row of the pre-agent pipeline: the representative PubTator species and
/// gene for a paper, optionally enriched with PubMed metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationRecord {
    pub pmid: Pmid,
    #[serde(default)]
    pub species_name: String,
    #[serde(default)]
    pub species_id: String,
    #[serde(default)]
    pub gene_name: String,
    #[serde(default)]
    pub gene_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub mesh: Option<String>,
}

impl AnnotationRecord {
    pub fn new(pmid: Pmid) -> Self {
        Self {
            pmid,
            species_name: String::new(),
            species_id: String::new(),
            gene_name: String::new(),
            gene_id: String::new(),
            title: None,
            abstract_text: None,
            mesh: None,
        }
    }

    pub fn has_species(&self) -> bool {
        !self.species_name.is_empty() || !self.species_id.is_empty()
    }

    /// Copies title, abstract and MeSH from `metadata`; a paper missing from
    /// the metadata response ends up with all three fields absent.
    pub fn merge_metadata(&mut self, metadata: Option<&PaperMetadata>) {
        match metadata {
            Some(meta) => {
                self.title = meta.title.clone();
                self.abstract_text = meta.abstract_text.clone();
                self.mesh = meta.mesh.clone();
            }
            None => {
                self.title = None;
                self.abstract_text = None;
                self.mesh = None;
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperMetadata {
    pub title: Option<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: Option<String>,
    pub mesh: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityMention {
    pub name: String,
    pub id: Option<String>,
}

/// Every distinct species and gene mention PubTator reports for one paper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentAnnotations {
    pub pmid: Pmid,
    pub species: Vec<EntityMention>,
    pub genes: Vec<EntityMention>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeciesGeneEntry {
    #[serde(default)]
    pub species_name: String,
    #[serde(default)]
    pub species_id: String,
    #[serde(default)]
    pub species_class: String,
    #[serde(default)]
    pub gene_name: String,
    #[serde(default)]
    pub gene_id: String,
}

impl SpeciesGeneEntry {
    pub fn has_gene(&self) -> bool {
        !self.gene_name.trim().is_empty() || !self.gene_id.trim().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPaperAnnotation")]
pub struct PaperAnnotation {
    pub pmid: Pmid,
    pub species_gene_list: Vec<SpeciesGeneEntry>,
    pub gene_research_type: Vec<String>,
}

impl PaperAnnotation {
    pub fn new(
        pmid: Pmid,
        species_gene_list: Vec<SpeciesGeneEntry>,
        gene_research_type: Vec<String>,
    ) -> Result<Self, CurateError> {
        if species_gene_list.is_empty() {
            return Err(CurateError::EmptySpeciesGeneList(pmid.to_string()));
        }
        Ok(Self {
            pmid,
            species_gene_list,
            gene_research_type,
        })
    }

    pub fn has_gene(&self) -> bool {
        self.species_gene_list.iter().any(SpeciesGeneEntry::has_gene)
    }
}

#[derive(Deserialize)]
struct RawPaperAnnotation {
    pmid: Pmid,
    #[serde(default)]
    species_gene_list: Vec<SpeciesGeneEntry>,
    #[serde(default)]
    gene_research_type: Vec<String>,
}

impl TryFrom<RawPaperAnnotation> for PaperAnnotation {
    type Error = CurateError;

    fn try_from(raw: RawPaperAnnotation) -> Result<Self, Self::Error> {
        PaperAnnotation::new(raw.pmid, raw.species_gene_list, raw.gene_research_type)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TaxonomyMode {
    Auto,
    NameToId,
    IdToName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum GeneMode {
    Auto,
    IdToInfo,
    IdToName,
    SpeciesAndNameToId,
}

/// An inclusive span of publication dates queried in one `esearch` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    /// Splits `[start, end]` into consecutive windows of `days_per_chunk` days;
    /// the last window is clipped to `end`.
    pub fn split(
        start: NaiveDate,
        end: NaiveDate,
        days_per_chunk: u32,
    ) -> Result<Vec<DateWindow>, CurateError> {
        if start > end {
            return Err(CurateError::InvalidDateRange {
                start: start.format(COMPACT_DATE).to_string(),
                end: end.format(COMPACT_DATE).to_string(),
            });
        }
        let step = i64::from(days_per_chunk.max(1));
        let mut windows = Vec::new();
        let mut current = start;
        while current <= end {
            let window_end = (current + Duration::days(step - 1)).min(end);
            windows.push(DateWindow {
                start: current,
                end: window_end,
            });
            current = window_end + Duration::days(1);
        }
        Ok(windows)
    }

    pub fn min_date(&self) -> String {
        self.start.format(QUERY_DATE).to_string()
    }

    pub fn max_date(&self) -> String {
        self.end.format(QUERY_DATE).to_string()
    }
}

impl fmt::Display for DateWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.min_date(), self.max_date())
    }
}

const COMPACT_DATE: &str = "%Y%m%d";
const QUERY_DATE: &str = "%Y/%m/%d";

pub fn parse_compact_date(value: &str) -> Result<NaiveDate, CurateError> {
    NaiveDate::parse_from_str(value.trim(), COMPACT_DATE)
        .map_err(|_| CurateError::InvalidDate(value.to_string()))
}
