use std::fs::{File, OpenOptions};
use std::io::Write;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::agent::{
    self, AgentReply, AgentVerdict, AnnotationAgent, PromptVariant, TokenUsage,
};
use crate::domain::{AnnotationRecord, PaperAnnotation, Pmid, SpeciesGeneEntry};
use crate::error::CurateError;
use crate::fs_util;
use crate::lookup::LookupClient;
use crate::ncbi::NcbiClient;
use crate::store::{self, AnnotationStore, AppendOutcome};

/// Accepts the worker's positional flag: `true`, `1` or `yes`.
pub fn parse_use_mcp(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerSummary {
    pub mode: &'static str,
    pub start: usize,
    pub end: usize,
    pub papers: usize,
    pub appended: usize,
    pub duplicates: usize,
    pub failed: usize,
    pub elapsed_secs: f64,
    pub usage: TokenUsage,
    pub log_file: Utf8PathBuf,
}

impl WorkerSummary {
    fn render(&self) -> String {
        let papers = self.papers.max(1) as f64;
        format!(
            "Mode: {}\nRange: [{}, {})\nTotal time: {:.1}s\nPapers: {} (appended {}, duplicates {}, failed {})\n\
             Avg time per paper: {:.1}s\nTokens: {} in, {} out, {} total\nLLM calls: {}\n\
             Cost: ${:.4} (avg ${:.4} per paper)\nLog file: {}\n",
            self.mode,
            self.start,
            self.end,
            self.elapsed_secs,
            self.papers,
            self.appended,
            self.duplicates,
            self.failed,
            self.elapsed_secs / papers,
            self.usage.input_tokens,
            self.usage.output_tokens,
            self.usage.total_tokens(),
            self.usage.calls,
            self.usage.cost,
            self.usage.cost / papers,
            self.log_file,
        )
    }
}

/// Final answer as written to the worker log, in the field order the
/// recovery matchers look for.
#[derive(Serialize)]
struct SolutionBlock<'a> {
    pmid: &'a Pmid,
    species_gene_list: &'a [SpeciesGeneEntry],
    gene_research_types: &'a [String],
}

/// Processes one slice of the paper table through the annotation agent.
pub struct Worker<A: AnnotationAgent, N: NcbiClient> {
    agent: A,
    store: AnnotationStore,
    lookup: Option<LookupClient<N>>,
    log_dir: Utf8PathBuf,
}

impl<A: AnnotationAgent, N: NcbiClient> Worker<A, N> {
    pub fn new(agent: A, store: AnnotationStore, log_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            agent,
            store,
            lookup: None,
            log_dir: log_dir.into(),
        }
    }

    /// Lookup client used to fill missing ids and classes in tool mode.
    pub fn with_lookup(mut self, lookup: LookupClient<N>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    pub fn run(
        &self,
        papers_csv: &Utf8Path,
        start: usize,
        end: usize,
        use_mcp: bool,
    ) -> Result<WorkerSummary, CurateError> {
        let records: Vec<AnnotationRecord> = store::read_csv(papers_csv)?;
        let end = end.min(records.len());
        let slice = records.get(start..end).unwrap_or_default();
        let mode = if use_mcp { "custom" } else { "default" };
        let variant = if use_mcp {
            PromptVariant::ToolAugmented
        } else {
            PromptVariant::Plain
        };

        let log_file = self.log_dir.join(format!(
            "{}_worker_{mode}_{start}_{end}.log",
            chrono::Local::now().format("%Y%m%d_%H%M%S")
        ));
        let mut log = open_log(&log_file)?;
        write_log(
            &mut log,
            &format!(
                "Worker started {}\nMode: {mode}\nPapers CSV: {papers_csv}\nRange: [{start}, {end})\nPapers: {}\n",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                slice.len()
            ),
        )?;
        tracing::info!(mode, start, end, papers = slice.len(), log = %log_file, "worker started");

        let started = Instant::now();
        let mut summary = WorkerSummary {
            mode,
            start,
            end,
            papers: slice.len(),
            appended: 0,
            duplicates: 0,
            failed: 0,
            elapsed_secs: 0.0,
            usage: TokenUsage::default(),
            log_file: log_file.clone(),
        };

        for (offset, record) in slice.iter().enumerate() {
            let number = start + offset + 1;
            write_log(
                &mut log,
                &format!("\n====\nPaper {number}: PMID={}\n====\n\n", record.pmid),
            )?;
            let paper_started = Instant::now();
            let prompt = agent::render_prompt(record, variant);

            let result = self
                .agent
                .annotate(&prompt)
                .and_then(|reply| self.record_reply(record, reply, use_mcp, &mut log, &mut summary));
            match result {
                Ok(AppendOutcome::Appended) => summary.appended += 1,
                Ok(AppendOutcome::Duplicate) => summary.duplicates += 1,
                Err(err) => {
                    summary.failed += 1;
                    tracing::error!(pmid = %record.pmid, paper = number, error = %err, "paper failed");
                    write_log(
                        &mut log,
                        &format!("Paper {number}: PMID={} - ERROR\nError: {err}\n", record.pmid),
                    )?;
                }
            }
            write_log(
                &mut log,
                &format!("Elapsed: {:.1}s\n", paper_started.elapsed().as_secs_f64()),
            )?;
        }

        summary.elapsed_secs = started.elapsed().as_secs_f64();
        let rendered = summary.render();
        write_log(&mut log, &format!("\n====\nSummary\n====\n{rendered}"))?;
        tracing::info!(
            mode,
            papers = summary.papers,
            appended = summary.appended,
            duplicates = summary.duplicates,
            failed = summary.failed,
            tokens = summary.usage.total_tokens(),
            cost = summary.usage.cost,
            "worker finished"
        );
        Ok(summary)
    }

    fn record_reply(
        &self,
        record: &AnnotationRecord,
        reply: AgentReply,
        use_mcp: bool,
        log: &mut File,
        summary: &mut WorkerSummary,
    ) -> Result<AppendOutcome, CurateError> {
        for line in &reply.transcript {
            write_log(log, &format!("{line}\n"))?;
        }
        summary.usage.accumulate(&reply.usage);
        write_log(
            log,
            &format!(
                "Tokens: {} in, {} out; cost ${:.4}\n",
                reply.usage.input_tokens, reply.usage.output_tokens, reply.usage.cost
            ),
        )?;

        let mut verdict = reply
            .verdict
            .ok_or_else(|| CurateError::Agent(format!("no verdict for PMID {}", record.pmid)))?;
        if use_mcp {
            if let Some(lookup) = &self.lookup {
                enrich(lookup, &mut verdict);
            }
        }

        let species_gene_list = agent::build_species_gene_list(&verdict.species, &verdict.genes);
        let annotation = PaperAnnotation::new(
            record.pmid.clone(),
            species_gene_list,
            verdict.gene_research_types,
        )?;
        let block = SolutionBlock {
            pmid: &annotation.pmid,
            species_gene_list: &annotation.species_gene_list,
            gene_research_types: &annotation.gene_research_type,
        };
        let json =
            serde_json::to_string(&block).map_err(|err| CurateError::Json(err.to_string()))?;
        write_log(log, &format!("<solution>\n{json}\n</solution>\n"))?;

        self.store.append(&annotation)
    }
}

/// Fills taxonomy ids, classes and gene ids the agent left empty. Genes are
/// resolved against the first species with an id.
fn enrich<N: NcbiClient>(lookup: &LookupClient<N>, verdict: &mut AgentVerdict) {
    for species in &mut verdict.species {
        if species.species_id.is_empty() && !species.species_name.is_empty() {
            species.species_id = lookup.taxonomy_id(&species.species_name);
        }
        if species.species_class.is_empty() && !species.species_id.is_empty() {
            species.species_class = lookup.taxonomy_info(&species.species_id).class_name;
        }
    }

    let Some(species_id) = verdict
        .species
        .iter()
        .map(|species| species.species_id.as_str())
        .find(|id| !id.is_empty())
    else {
        return;
    };
    for gene in &mut verdict.genes {
        if gene.gene_id.is_empty() && !gene.gene_name.is_empty() {
            gene.gene_id = lookup.gene_id(species_id, &gene.gene_name);
        }
    }
}

fn open_log(path: &Utf8Path) -> Result<File, CurateError> {
    fs_util::ensure_parent(path)?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path.as_std_path())
        .map_err(|err| CurateError::Filesystem(format!("open {path}: {err}")))
}

fn write_log(log: &mut File, text: &str) -> Result<(), CurateError> {
    log.write_all(text.as_bytes())
        .map_err(|err| CurateError::Filesystem(err.to_string()))
}
