use std::collections::HashMap;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::batch::{self, BatchDriver};
use crate::config::Config;
use crate::domain::{AnnotationRecord, DateWindow, PaperMetadata, Pmid};
use crate::error::CurateError;
use crate::filter::{self, AnnotationSummary, ExclusionSet, FilterStats};
use crate::fs_util;
use crate::ncbi::NcbiClient;
use crate::pubmed;
use crate::pubtator::{self, PubtatorClient};
use crate::store;

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone, Serialize)]
pub struct PreAgentResult {
    pub period: String,
    pub windows: usize,
    pub failed_windows: usize,
    pub pmids: usize,
    pub annotated: usize,
    pub failed_annotation_chunks: usize,
    pub with_metadata: usize,
    pub failed_metadata_chunks: usize,
    pub filter: Option<FilterStats>,
    pub final_csv: Option<Utf8PathBuf>,
    pub files: Vec<Utf8PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FilterResult {
    pub input: Utf8PathBuf,
    pub stats: FilterStats,
    pub kept_csv: Option<Utf8PathBuf>,
    pub excluded_csv: Option<Utf8PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PubtatorFilterResult {
    pub timestamp: String,
    pub input_pmids: usize,
    pub fetched: usize,
    pub failed_chunks: usize,
    pub failed_pmids: usize,
    pub excluded_by_model_organism: usize,
    pub excluded_by_no_species: usize,
    pub excluded_by_no_genes: usize,
    pub kept: usize,
    pub all_stats: AnnotationSummary,
    pub filtered_stats: AnnotationSummary,
    pub output_dir: Utf8PathBuf,
}

/// Column layout of the PubTator step output.
#[derive(Serialize)]
struct AnnotationRow<'a> {
    pmid: &'a Pmid,
    species_name: &'a str,
    species_id: &'a str,
    gene_name: &'a str,
    gene_id: &'a str,
}

impl<'a> From<&'a AnnotationRecord> for AnnotationRow<'a> {
    fn from(record: &'a AnnotationRecord) -> Self {
        Self {
            pmid: &record.pmid,
            species_name: &record.species_name,
            species_id: &record.species_id,
            gene_name: &record.gene_name,
            gene_id: &record.gene_id,
        }
    }
}

#[derive(Deserialize)]
struct PmidRow {
    pmid: String,
}

pub fn timestamp() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

fn emit(sink: &dyn ProgressSink, message: String, started: Option<Instant>) {
    sink.event(ProgressEvent {
        message,
        elapsed: started.map(|started| started.elapsed()),
    });
}

pub struct Pipeline<N: NcbiClient, P: PubtatorClient> {
    ncbi: N,
    pubtator: P,
    config: Config,
}

impl<N: NcbiClient, P: PubtatorClient> Pipeline<N, P> {
    pub fn new(ncbi: N, pubtator: P, config: Config) -> Self {
        Self {
            ncbi,
            pubtator,
            config,
        }
    }

    fn driver(&self, chunk_size: usize) -> BatchDriver {
        let settings = &self.config.pre_agent;
        BatchDriver::new(chunk_size)
            .with_retries(settings.max_retries, settings.retry_delay())
            .with_pace(self.config.http.pace())
    }

    /// Date range to filtered paper table: PMID search, PubTator annotations,
    /// PubMed metadata, model organism exclusion. Every step leaves its
    /// artefact in the pre-agent output directory.
    pub fn run_pre_agent(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        exclusion: &ExclusionSet,
        sink: &dyn ProgressSink,
    ) -> Result<PreAgentResult, CurateError> {
        let windows = DateWindow::split(start, end, self.config.pre_agent.days_per_chunk)?;
        let out_dir = self.config.pre_agent.output_dir.clone();
        let ts = timestamp();
        let period = format!("{}_{}", start.format("%Y%m%d"), end.format("%Y%m%d"));
        let suffix = format!("{ts}_{period}");
        let mut result = PreAgentResult {
            period: period.clone(),
            windows: windows.len(),
            failed_windows: 0,
            pmids: 0,
            annotated: 0,
            failed_annotation_chunks: 0,
            with_metadata: 0,
            failed_metadata_chunks: 0,
            filter: None,
            final_csv: None,
            files: Vec::new(),
        };

        let started = Instant::now();
        emit(sink, format!("phase=Search; {} date windows", windows.len()), None);
        let search = self.driver(1).run("esearch", &windows, |chunk| {
            let mut pmids = Vec::new();
            for window in chunk {
                pmids.extend(pubmed::search_window(&self.ncbi, window)?);
            }
            Ok(pmids)
        });
        let pmids = pubmed::dedup_pmids(search.results);
        result.pmids = pmids.len();
        result.failed_windows = search.failed.len();
        let pmid_file = out_dir.join(format!("{suffix}.txt"));
        store::write_lines(&pmid_file, pmids.iter().map(Pmid::as_str))?;
        result.files.push(pmid_file);
        if !search.failed.is_empty() {
            let path = out_dir.join(format!("step1_failed_windows_{suffix}.txt"));
            batch::write_failure_report(&path, &search.failed)?;
            result.files.push(path);
        }
        emit(sink, format!("phase=Search; {} unique PMIDs", pmids.len()), Some(started));
        if pmids.is_empty() {
            tracing::warn!(period = %period, "no PMIDs found; stopping");
            return Ok(result);
        }

        let started = Instant::now();
        emit(sink, "phase=Annotate; querying PubTator".to_string(), None);
        let annotations = self
            .driver(self.config.pre_agent.pubtator_chunk_size)
            .run("pubtator", &pmids, |chunk| {
                pubtator::fetch_records(&self.pubtator, chunk)
            });
        let mut records = annotations.results;
        result.annotated = records.len();
        result.failed_annotation_chunks = annotations.failed.len();
        let rows: Vec<AnnotationRow<'_>> = records.iter().map(AnnotationRow::from).collect();
        let step2 = out_dir.join(format!("step2_pubtator_{suffix}.csv"));
        if store::write_csv(&step2, &rows)? {
            result.files.push(step2);
        }
        if !annotations.failed.is_empty() {
            let path = out_dir.join(format!("step2_failed_chunks_{suffix}.txt"));
            batch::write_failure_report(&path, &annotations.failed)?;
            result.files.push(path);
        }
        emit(sink, format!("phase=Annotate; {} records", records.len()), Some(started));
        if records.is_empty() {
            tracing::warn!(period = %period, "no PubTator annotations; stopping");
            return Ok(result);
        }

        let started = Instant::now();
        emit(sink, "phase=Metadata; querying PubMed".to_string(), None);
        let annotated: Vec<Pmid> = records.iter().map(|record| record.pmid.clone()).collect();
        let metadata = self
            .driver(self.config.pre_agent.metadata_chunk_size)
            .run("efetch", &annotated, |chunk| {
                pubmed::fetch_metadata(&self.ncbi, chunk)
            });
        result.failed_metadata_chunks = metadata.failed.len();
        let by_pmid: HashMap<Pmid, PaperMetadata> = metadata.results.into_iter().collect();
        for record in &mut records {
            let found = by_pmid.get(&record.pmid);
            if found.is_some() {
                result.with_metadata += 1;
            }
            record.merge_metadata(found);
        }
        let step3 = out_dir.join(format!("step3_with_metadata_{suffix}.csv"));
        if store::write_csv(&step3, &records)? {
            result.files.push(step3);
        }
        if !metadata.failed.is_empty() {
            let path = out_dir.join(format!("step3_failed_chunks_{suffix}.txt"));
            batch::write_failure_report(&path, &metadata.failed)?;
            result.files.push(path);
        }
        emit(
            sink,
            format!("phase=Metadata; {} of {} records enriched", result.with_metadata, records.len()),
            Some(started),
        );

        let outcome = filter::filter_records(records, exclusion);
        let excluded = out_dir.join(format!("step4_excluded_{suffix}.csv"));
        if store::write_csv(&excluded, &outcome.excluded)? {
            result.files.push(excluded);
        }
        let final_csv = out_dir.join(format!("FINAL_{suffix}.csv"));
        if store::write_csv(&final_csv, &outcome.kept)? {
            result.files.push(final_csv.clone());
            result.final_csv = Some(final_csv);
        }
        emit(
            sink,
            format!("phase=Filter; kept {} of {}", outcome.stats.kept, outcome.stats.input),
            None,
        );
        result.filter = Some(outcome.stats);
        Ok(result)
    }

    /// Re-applies the model organism exclusion to an existing metadata table.
    pub fn run_filter(
        &self,
        input: &Utf8Path,
        exclusion: &ExclusionSet,
        sink: &dyn ProgressSink,
    ) -> Result<FilterResult, CurateError> {
        let records: Vec<AnnotationRecord> = store::read_csv(input)?;
        emit(sink, format!("phase=Filter; {} records from {input}", records.len()), None);
        let outcome = filter::filter_records(records, exclusion);

        let out_dir = &self.config.pre_agent.output_dir;
        let ts = timestamp();
        let excluded = out_dir.join(format!("step4_excluded_{ts}.csv"));
        let kept = out_dir.join(format!("FINAL_{ts}.csv"));
        let excluded_csv = store::write_csv(&excluded, &outcome.excluded)?.then_some(excluded);
        let kept_csv = store::write_csv(&kept, &outcome.kept)?.then_some(kept);

        Ok(FilterResult {
            input: input.to_owned(),
            stats: outcome.stats,
            kept_csv,
            excluded_csv,
        })
    }

    /// Full PubTator mention lists for a PMID file, filtered at document
    /// level, with statistics before and after filtering.
    pub fn run_pubtator_filter(
        &self,
        input: &Utf8Path,
        exclusion: &ExclusionSet,
        sink: &dyn ProgressSink,
    ) -> Result<PubtatorFilterResult, CurateError> {
        let pmids = read_pmid_file(input)?;
        let out_dir = self.config.pubtator_filter.output_dir.clone();
        let ts = timestamp();
        let started = Instant::now();
        emit(sink, format!("phase=Annotate; {} PMIDs", pmids.len()), None);

        let driver = self.driver(self.config.pubtator_filter.chunk_size);
        let fetched = driver.run("pubtator", &pmids, |chunk| {
            pubtator::fetch_documents(&self.pubtator, chunk)
        });
        if !fetched.failed.is_empty() {
            let path = out_dir.join(format!("failed_chunks_{ts}.txt"));
            batch::write_failure_report(&path, &fetched.failed)?;
        }
        let failed_chunks = fetched.failed.len();
        let failed_pmids = fetched.failed_items();
        let documents = fetched.results;
        emit(sink, format!("phase=Annotate; {} documents", documents.len()), Some(started));

        let all_stats = filter::summarize(&documents);
        store::write_json(&out_dir.join(format!("all_annotations_{ts}.json")), &documents)?;
        store::write_json(&out_dir.join(format!("all_stats_{ts}.json")), &all_stats)?;

        let fetched_count = documents.len();
        let outcome = filter::filter_documents(documents, exclusion);
        let filtered_stats = filter::summarize(&outcome.kept);
        let files = [
            ("filtered_annotations", &outcome.kept),
            ("excluded_by_model_organism", &outcome.excluded_by_model_organism),
            ("excluded_by_no_species", &outcome.excluded_by_no_species),
            ("excluded_by_no_genes", &outcome.excluded_by_no_genes),
        ];
        for (name, documents) in files {
            store::write_json(&out_dir.join(format!("{name}_{ts}.json")), documents)?;
        }
        store::write_json(&out_dir.join(format!("filtered_stats_{ts}.json")), &filtered_stats)?;

        let mut kept_pmids: Vec<&Pmid> = outcome.kept.iter().map(|doc| &doc.pmid).collect();
        kept_pmids.sort();
        store::write_lines(
            &out_dir.join(format!("filtered_pmids_{ts}.txt")),
            kept_pmids.iter().map(|pmid| pmid.as_str()),
        )?;

        let result = PubtatorFilterResult {
            timestamp: ts.clone(),
            input_pmids: pmids.len(),
            fetched: fetched_count,
            failed_chunks,
            failed_pmids,
            excluded_by_model_organism: outcome.excluded_by_model_organism.len(),
            excluded_by_no_species: outcome.excluded_by_no_species.len(),
            excluded_by_no_genes: outcome.excluded_by_no_genes.len(),
            kept: outcome.kept.len(),
            all_stats,
            filtered_stats,
            output_dir: out_dir.clone(),
        };
        store::write_json(&out_dir.join(format!("summary_report_{ts}.json")), &result)?;
        emit(
            sink,
            format!("phase=Filter; kept {} of {}", result.kept, result.fetched),
            None,
        );
        Ok(result)
    }
}

/// PMIDs from a `.csv` with a `pmid` column or from a file with one PMID per
/// line. Invalid entries are skipped; duplicates keep their first position.
pub fn read_pmid_file(path: &Utf8Path) -> Result<Vec<Pmid>, CurateError> {
    let raw: Vec<String> = if path.extension() == Some("csv") {
        store::read_csv::<PmidRow>(path)?
            .into_iter()
            .map(|row| row.pmid)
            .collect()
    } else {
        fs_util::read_optional(path)?
            .ok_or_else(|| CurateError::Filesystem(format!("{path} not found")))?
            .lines()
            .map(str::to_string)
            .collect()
    };

    let mut pmids = Vec::with_capacity(raw.len());
    for value in raw {
        if value.trim().is_empty() {
            continue;
        }
        match value.parse::<Pmid>() {
            Ok(pmid) => pmids.push(pmid),
            Err(err) => tracing::warn!(path = %path, error = %err, "skipping PMID entry"),
        }
    }
    Ok(pubmed::dedup_pmids(pmids))
}
