use std::collections::HashMap;
use std::thread;

use serde::{Deserialize, Serialize};

use crate::config::ModelSpeciesConfig;
use crate::error::CurateError;
use crate::lookup::LookupClient;
use crate::ncbi::NcbiClient;
use crate::store;

const NOT_FOUND: &str = "NotFound";

#[derive(Deserialize)]
struct OrganismRow {
    #[serde(default)]
    organism_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpeciesRow {
    pub species_name: String,
    pub english_name: String,
    #[serde(rename = "NCBI_taxonomy_id")]
    pub taxonomy_id: String,
    pub rank: usize,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RankedOrganism {
    pub rank: usize,
    pub organism_name: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SelectionReport {
    pub organisms: usize,
    pub samples: usize,
    pub selected: Vec<ModelSpeciesRow>,
    pub resolved: usize,
    /// Share of samples covered by the selected organisms, in percent.
    pub coverage: f64,
}

/// Organism names by descending count. Equal counts keep first-seen order;
/// empty and `NotFound` names are not counted.
pub fn rank_organisms<I>(names: I) -> Vec<RankedOrganism>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    for name in names {
        let name = name.as_ref().trim();
        if name.is_empty() || name == NOT_FOUND {
            continue;
        }
        let count = counts.entry(name.to_string()).or_insert(0);
        if *count == 0 {
            order.push(name.to_string());
        }
        *count += 1;
    }

    let mut ranked: Vec<(String, usize)> = order
        .into_iter()
        .map(|name| {
            let count = counts.get(&name).copied().unwrap_or_default();
            (name, count)
        })
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1));
    ranked
        .into_iter()
        .enumerate()
        .map(|(index, (organism_name, count))| RankedOrganism {
            rank: index + 1,
            organism_name,
            count,
        })
        .collect()
}

/// Builds the model organism list from a sample metadata table: the most
/// frequent organisms, each resolved to a taxonomy id and common name.
pub fn select_model_species<N: NcbiClient>(
    lookup: &LookupClient<N>,
    config: &ModelSpeciesConfig,
) -> Result<SelectionReport, CurateError> {
    let rows: Vec<OrganismRow> = store::read_csv(&config.input_csv)?;
    let ranked = rank_organisms(rows.iter().map(|row| row.organism_name.as_str()));
    let samples: usize = ranked.iter().map(|organism| organism.count).sum();
    tracing::info!(
        path = %config.input_csv,
        rows = rows.len(),
        organisms = ranked.len(),
        "counted organisms"
    );

    store::write_csv(&config.output_all_ranked, &ranked)?;

    let mut selected = Vec::new();
    let mut resolved = 0;
    for (index, organism) in ranked.iter().take(config.top_n).enumerate() {
        if index > 0 && !config.pace().is_zero() {
            thread::sleep(config.pace());
        }
        let summary = lookup.summarize_species(&organism.organism_name);
        if summary.is_some() {
            resolved += 1;
        }
        let (taxonomy_id, english_name) = match summary {
            Some(summary) => (
                summary.taxonomy_id,
                summary.common_name.unwrap_or_else(|| NOT_FOUND.to_string()),
            ),
            None => (NOT_FOUND.to_string(), NOT_FOUND.to_string()),
        };
        selected.push(ModelSpeciesRow {
            species_name: organism.organism_name.clone(),
            english_name,
            taxonomy_id,
            rank: organism.rank,
            count: organism.count,
        });
    }
    store::write_csv(&config.output_csv, &selected)?;

    let covered: usize = selected.iter().map(|row| row.count).sum();
    let coverage = if samples == 0 {
        0.0
    } else {
        (covered as f64 / samples as f64 * 10_000.0).round() / 100.0
    };
    tracing::info!(
        selected = selected.len(),
        resolved,
        coverage_percent = coverage,
        "model organism list written"
    );

    Ok(SelectionReport {
        organisms: ranked.len(),
        samples,
        selected,
        resolved,
        coverage,
    })
}
