//! Rebuilds paper annotations from worker logs when the ledger is missing
//! entries, e.g. after a worker crashed between answering and appending.

use std::collections::HashMap;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::domain::{PaperAnnotation, Pmid};
use crate::error::CurateError;
use crate::filter::{self, ExclusionSet};
use crate::pipeline;
use crate::store::{self, AnnotationStore};

/// One way of spotting a final answer in a transcript segment.
pub trait TranscriptMatcher {
    fn name(&self) -> &'static str;

    /// Raw annotation object for `pmid`, if the segment contains one.
    fn extract(&self, pmid: &Pmid, segment: &str) -> Option<Value>;
}

fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(regex) => Some(regex),
        Err(err) => {
            tracing::error!(pattern, error = %err, "invalid transcript pattern");
            None
        }
    }
}

/// Python dict printed by the agent: `{'pmid': '<id>', ... 'gene_research_types': [...]}`.
pub struct PythonPmidDict;

impl TranscriptMatcher for PythonPmidDict {
    fn name(&self) -> &'static str {
        "python_pmid_dict"
    }

    fn extract(&self, pmid: &Pmid, segment: &str) -> Option<Value> {
        let pattern = format!(
            r"(?s)\{{'(?:pmid|PMID)':\s*'{}'.*?'gene_research_types':\s*\[.*?\]\}}",
            regex::escape(pmid.as_str())
        );
        let found = compile(&pattern)?.find(segment)?;
        python_literal_to_json(found.as_str())
    }
}

/// `<solution>` block holding a JSON object keyed by this PMID.
pub struct SolutionPmidJson;

impl TranscriptMatcher for SolutionPmidJson {
    fn name(&self) -> &'static str {
        "solution_pmid_json"
    }

    fn extract(&self, pmid: &Pmid, segment: &str) -> Option<Value> {
        let pattern = format!(
            r#"(?s)<solution>\s*\{{\s*"(?:pmid|PMID)":\s*"{}".*?"gene_research_types":\s*\[.*?\]\s*\}}\s*</solution>"#,
            regex::escape(pmid.as_str())
        );
        let block = compile(&pattern)?.find(segment)?;
        let object = compile(r"(?s)\{.*\}")?.find(block.as_str())?;
        serde_json::from_str(object.as_str()).ok()
    }
}

/// `<solution>` block holding a JSON object with a `species_gene_list` but no
/// PMID.
pub struct SolutionSpeciesJson {
    pattern: Option<Regex>,
}

impl SolutionSpeciesJson {
    pub fn new() -> Self {
        Self {
            pattern: compile(r#"(?s)<solution>\s*(\{.*?"species_gene_list".*?\})\s*</solution>"#),
        }
    }
}

impl Default for SolutionSpeciesJson {
    fn default() -> Self {
        Self::new()
    }
}

impl TranscriptMatcher for SolutionSpeciesJson {
    fn name(&self) -> &'static str {
        "solution_species_json"
    }

    fn extract(&self, _pmid: &Pmid, segment: &str) -> Option<Value> {
        let captures = self.pattern.as_ref()?.captures(segment)?;
        serde_json::from_str(captures.get(1)?.as_str()).ok()
    }
}

/// `result_dict = {...}` assignment inside executed code.
pub struct ResultDictAssignment {
    pattern: Option<Regex>,
}

impl ResultDictAssignment {
    pub fn new() -> Self {
        Self {
            pattern: compile(r"result_dict\s*=\s*(\{(?:[^{}]|\{[^{}]*\})*\})"),
        }
    }
}

impl Default for ResultDictAssignment {
    fn default() -> Self {
        Self::new()
    }
}

impl TranscriptMatcher for ResultDictAssignment {
    fn name(&self) -> &'static str {
        "result_dict"
    }

    fn extract(&self, _pmid: &Pmid, segment: &str) -> Option<Value> {
        self.pattern
            .as_ref()?
            .captures_iter(segment)
            .filter_map(|captures| captures.get(1))
            .filter(|literal| literal.as_str().contains("species_gene_list"))
            .find_map(|literal| python_literal_to_json(literal.as_str()))
    }
}

/// Flat dict with both keys anywhere inside an `<execute>` or `<solution>`
/// block.
pub struct BlockFlatDict {
    blocks: Option<Regex>,
    dict: Option<Regex>,
}

impl BlockFlatDict {
    pub fn new() -> Self {
        Self {
            blocks: compile(r"(?s)<execute>.*?</execute>|<solution>.*?</solution>"),
            dict: compile(
                r#"\{[^{}]*["']species_gene_list["'][^{}]*\[[^\]]*\][^{}]*["']gene_research_types["'][^{}]*\[[^\]]*\][^{}]*\}"#,
            ),
        }
    }
}

impl Default for BlockFlatDict {
    fn default() -> Self {
        Self::new()
    }
}

impl TranscriptMatcher for BlockFlatDict {
    fn name(&self) -> &'static str {
        "block_flat_dict"
    }

    fn extract(&self, _pmid: &Pmid, segment: &str) -> Option<Value> {
        let dict = self.dict.as_ref()?;
        self.blocks
            .as_ref()?
            .find_iter(segment)
            .flat_map(|block| dict.find_iter(block.as_str()))
            .find_map(|found| {
                serde_json::from_str(found.as_str())
                    .ok()
                    .or_else(|| python_literal_to_json(found.as_str()))
            })
    }
}

/// Converts a Python dict/list literal to JSON: quotes become double quotes,
/// `True`/`False`/`None` become `true`/`false`/`null` and trailing commas
/// are dropped. `None` when the result still does not parse.
pub fn python_literal_to_json(literal: &str) -> Option<Value> {
    let mut out = String::with_capacity(literal.len());
    let mut chars = literal.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '\'' | '"' => {
                out.push('"');
                loop {
                    match chars.next()? {
                        '\\' => match chars.next()? {
                            '\'' => out.push('\''),
                            escaped => {
                                out.push('\\');
                                out.push(escaped);
                            }
                        },
                        c if c == ch => break,
                        '"' => out.push_str("\\\""),
                        '\n' => out.push_str("\\n"),
                        '\t' => out.push_str("\\t"),
                        c => out.push(c),
                    }
                }
                out.push('"');
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut word = String::from(c);
                while let Some(&next) = chars.peek() {
                    if !(next.is_ascii_alphanumeric() || next == '_') {
                        break;
                    }
                    word.push(next);
                    chars.next();
                }
                match word.as_str() {
                    "True" => out.push_str("true"),
                    "False" => out.push_str("false"),
                    "None" => out.push_str("null"),
                    other => out.push_str(other),
                }
            }
            '}' | ']' => {
                let trimmed = out.trim_end().len();
                out.truncate(trimmed);
                if out.ends_with(',') {
                    out.pop();
                }
                out.push(ch);
            }
            c => out.push(c),
        }
    }
    serde_json::from_str(&out).ok()
}

/// Matchers in priority order.
pub fn default_matchers() -> Vec<Box<dyn TranscriptMatcher>> {
    vec![
        Box::new(PythonPmidDict),
        Box::new(SolutionPmidJson),
        Box::new(SolutionSpeciesJson::new()),
        Box::new(ResultDictAssignment::new()),
        Box::new(BlockFlatDict::new()),
    ]
}

/// Turns a matched object into an annotation for `pmid`. A missing or empty
/// `species_gene_list` becomes one entry with empty fields.
pub fn to_annotation(pmid: &Pmid, value: Value) -> Option<PaperAnnotation> {
    let Value::Object(mut map) = store::normalize_keys(value) else {
        return None;
    };
    map.insert("pmid".to_string(), Value::String(pmid.to_string()));
    let has_entries = matches!(map.get("species_gene_list"), Some(Value::Array(list)) if !list.is_empty());
    if !has_entries {
        map.insert(
            "species_gene_list".to_string(),
            Value::Array(vec![Value::Object(Map::new())]),
        );
    }
    match serde_json::from_value(Value::Object(map)) {
        Ok(annotation) => Some(annotation),
        Err(err) => {
            tracing::debug!(pmid = %pmid, error = %err, "matched object is not an annotation");
            None
        }
    }
}

/// Text following this paper's header, up to the next paper header.
fn paper_segment<'a>(log: &'a str, pmid: &Pmid) -> Option<&'a str> {
    let header = compile(&format!(r"Paper \d+: PMID={}\b", regex::escape(pmid.as_str())))?;
    let next_header = compile(r"\n====\nPaper \d+: PMID=")?;
    let found = header.find(log)?;
    let rest = &log[found.end()..];
    Some(match next_header.find(rest) {
        Some(next) => &rest[..next.start()],
        None => rest,
    })
}

#[derive(Debug, Clone, Serialize)]
pub struct RecoveryReport {
    pub total_pmids: usize,
    pub from_ledger: usize,
    pub from_logs: usize,
    pub missing: Vec<Pmid>,
    pub collected: usize,
    pub kept: usize,
    pub excluded_by_model_organism: usize,
    pub excluded_by_no_gene: usize,
    pub output_all: Utf8PathBuf,
    pub output_filtered: Utf8PathBuf,
}

pub struct Recovery {
    matchers: Vec<Box<dyn TranscriptMatcher>>,
    log_prefix: String,
}

impl Recovery {
    pub fn new(log_prefix: impl Into<String>) -> Self {
        Self {
            matchers: default_matchers(),
            log_prefix: log_prefix.into(),
        }
    }

    pub fn with_matchers(mut self, matchers: Vec<Box<dyn TranscriptMatcher>>) -> Self {
        self.matchers = matchers;
        self
    }

    /// Log file contents under `dir` whose name starts with the prefix,
    /// sorted by file name.
    pub fn read_logs(&self, dir: &Utf8Path) -> Result<Vec<(Utf8PathBuf, String)>, CurateError> {
        let entries = match fs::read_dir(dir.as_std_path()) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(dir = %dir, "log directory not found");
                return Ok(Vec::new());
            }
            Err(err) => return Err(CurateError::Filesystem(format!("read {dir}: {err}"))),
        };

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| CurateError::Filesystem(err.to_string()))?;
            let Ok(path) = Utf8PathBuf::from_path_buf(entry.path()) else {
                continue;
            };
            let matches = path
                .file_name()
                .is_some_and(|name| name.starts_with(&self.log_prefix) && name.ends_with(".log"));
            if matches {
                paths.push(path);
            }
        }
        paths.sort();

        let mut logs = Vec::with_capacity(paths.len());
        for path in paths {
            let bytes = fs::read(path.as_std_path())
                .map_err(|err| CurateError::Filesystem(format!("read {path}: {err}")))?;
            logs.push((path, String::from_utf8_lossy(&bytes).into_owned()));
        }
        tracing::info!(dir = %dir, files = logs.len(), "loaded worker logs");
        Ok(logs)
    }

    /// First annotation any matcher finds for `pmid`, scanning logs in order.
    pub fn recover_pmid(&self, pmid: &Pmid, logs: &[(Utf8PathBuf, String)]) -> Option<PaperAnnotation> {
        for (path, content) in logs {
            let Some(segment) = paper_segment(content, pmid) else {
                continue;
            };
            for matcher in &self.matchers {
                let Some(value) = matcher.extract(pmid, segment) else {
                    continue;
                };
                if let Some(annotation) = to_annotation(pmid, value) {
                    tracing::debug!(pmid = %pmid, log = %path, matcher = matcher.name(), "recovered from log");
                    return Some(annotation);
                }
            }
        }
        None
    }

    /// Collects one annotation per PMID of `papers_csv`: the ledger entry
    /// when present, otherwise whatever the logs yield. Writes every
    /// collected paper and the model organism filtered subset.
    pub fn run(
        &self,
        papers_csv: &Utf8Path,
        ledger: &AnnotationStore,
        log_dir: &Utf8Path,
        exclusion: &ExclusionSet,
        output_all: &Utf8Path,
        output_filtered: &Utf8Path,
    ) -> Result<RecoveryReport, CurateError> {
        let mut pmids = pipeline::read_pmid_file(papers_csv)?;
        pmids.sort();
        let stored: HashMap<Pmid, PaperAnnotation> = ledger
            .load()?
            .into_iter()
            .map(|paper| (paper.pmid.clone(), paper))
            .collect();
        let logs = self.read_logs(log_dir)?;

        let mut collected = Vec::with_capacity(pmids.len());
        let mut missing = Vec::new();
        let mut from_ledger = 0;
        let mut from_logs = 0;
        for pmid in &pmids {
            if let Some(paper) = stored.get(pmid) {
                collected.push(paper.clone());
                from_ledger += 1;
            } else if let Some(paper) = self.recover_pmid(pmid, &logs) {
                collected.push(paper);
                from_logs += 1;
            } else {
                missing.push(pmid.clone());
            }
        }
        tracing::info!(
            total = pmids.len(),
            from_ledger,
            from_logs,
            missing = missing.len(),
            "collection finished"
        );

        store::write_json(output_all, &collected)?;
        let count = collected.len();
        let outcome = filter::filter_papers(collected, exclusion);
        store::write_json(output_filtered, &outcome.kept)?;

        Ok(RecoveryReport {
            total_pmids: pmids.len(),
            from_ledger,
            from_logs,
            missing,
            collected: count,
            kept: outcome.kept.len(),
            excluded_by_model_organism: outcome.excluded_by_model_organism.len(),
            excluded_by_no_gene: outcome.excluded_by_no_gene.len(),
            output_all: output_all.to_owned(),
            output_filtered: output_filtered.to_owned(),
        })
    }
}
