use std::fs::File;
use std::io::Read;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::domain::{PaperAnnotation, Pmid};
use crate::error::CurateError;
use crate::fs_util;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AppendOutcome {
    Appended,
    Duplicate,
}

/// Append-only JSON array of paper annotations keyed by PMID.
///
/// Existing entries are kept as raw JSON so an append never drops content it
/// does not understand. One writer at a time.
#[derive(Debug, Clone)]
pub struct AnnotationStore {
    path: Utf8PathBuf,
}

impl AnnotationStore {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Current array contents. A missing file is empty; a file that is not a
    /// JSON array is logged and treated as empty.
    fn read_entries(&self) -> Result<Vec<Value>, CurateError> {
        let Some(content) = fs_util::read_optional(&self.path)? else {
            return Ok(Vec::new());
        };
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        match serde_json::from_str::<Value>(&content) {
            Ok(Value::Array(entries)) => Ok(entries),
            Ok(_) => {
                tracing::warn!(path = %self.path, "existing ledger is not a list; starting a new list");
                Ok(Vec::new())
            }
            Err(err) => {
                tracing::error!(path = %self.path, error = %err, "failed to parse existing ledger; starting a new list");
                Ok(Vec::new())
            }
        }
    }

    pub fn contains(&self, pmid: &Pmid) -> Result<bool, CurateError> {
        Ok(self
            .read_entries()?
            .iter()
            .any(|entry| entry_pmid(entry).as_deref() == Some(pmid.as_str())))
    }

    pub fn append(&self, annotation: &PaperAnnotation) -> Result<AppendOutcome, CurateError> {
        let mut entries = self.read_entries()?;
        let pmid = annotation.pmid.as_str();
        if entries
            .iter()
            .any(|entry| entry_pmid(entry).as_deref() == Some(pmid))
        {
            tracing::warn!(pmid, path = %self.path, "PMID already in ledger; skipping");
            return Ok(AppendOutcome::Duplicate);
        }

        let value =
            serde_json::to_value(annotation).map_err(|err| CurateError::Json(err.to_string()))?;
        entries.push(value);
        let content = serde_json::to_vec_pretty(&entries)
            .map_err(|err| CurateError::Json(err.to_string()))?;
        fs_util::write_atomic(&self.path, &content)?;

        tracing::info!(
            pmid,
            path = %self.path,
            species_gene_pairs = annotation.species_gene_list.len(),
            research_types = annotation.gene_research_type.len(),
            "added paper to ledger"
        );
        Ok(AppendOutcome::Appended)
    }

    /// Typed ledger contents. Accepts a JSON array or one JSON object per
    /// line; entries that do not validate are skipped with a warning.
    pub fn load(&self) -> Result<Vec<PaperAnnotation>, CurateError> {
        let Some(content) = fs_util::read_optional(&self.path)? else {
            return Ok(Vec::new());
        };
        let values = match serde_json::from_str::<Value>(&content) {
            Ok(Value::Array(entries)) => entries,
            Ok(single @ Value::Object(_)) => vec![single],
            Ok(_) => {
                return Err(CurateError::Json(format!("{} is not a JSON array", self.path)));
            }
            Err(_) => parse_json_lines(&content)?,
        };

        let mut papers = Vec::new();
        for value in values {
            match serde_json::from_value::<PaperAnnotation>(normalize_keys(value)) {
                Ok(paper) => papers.push(paper),
                Err(err) => tracing::warn!(path = %self.path, error = %err, "skipping invalid ledger entry"),
            }
        }
        Ok(papers)
    }
}

fn entry_pmid(entry: &Value) -> Option<String> {
    match entry.get("pmid").or_else(|| entry.get("PMID"))? {
        Value::String(value) => Some(value.trim().to_string()),
        Value::Number(value) => Some(value.to_string()),
        _ => None,
    }
}

fn parse_json_lines(content: &str) -> Result<Vec<Value>, CurateError> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(index, line)| {
            serde_json::from_str(line)
                .map_err(|err| CurateError::Json(format!("line {}: {err}", index + 1)))
        })
        .collect()
}

/// Renames keys written by older tooling: `PMID` to `pmid` and
/// `gene_research_types` to `gene_research_type`. Numeric PMIDs become
/// strings.
pub fn normalize_keys(mut value: Value) -> Value {
    if let Value::Object(map) = &mut value {
        if !map.contains_key("pmid") {
            if let Some(pmid) = map.remove("PMID") {
                map.insert("pmid".to_string(), pmid);
            }
        }
        if let Some(Value::Number(number)) = map.get("pmid") {
            let text = number.to_string();
            map.insert("pmid".to_string(), Value::String(text));
        }
        if !map.contains_key("gene_research_type") {
            if let Some(types) = map.remove("gene_research_types") {
                map.insert("gene_research_type".to_string(), types);
            }
        }
    }
    value
}

pub fn write_json<T: Serialize + ?Sized>(path: &Utf8Path, value: &T) -> Result<(), CurateError> {
    let content =
        serde_json::to_vec_pretty(value).map_err(|err| CurateError::Json(err.to_string()))?;
    fs_util::write_atomic(path, &content)?;
    tracing::info!(path = %path, "saved JSON");
    Ok(())
}

/// Writes `rows` with a header taken from the row type. Nothing is written
/// for an empty slice.
pub fn write_csv<T: Serialize>(path: &Utf8Path, rows: &[T]) -> Result<bool, CurateError> {
    if rows.is_empty() {
        tracing::warn!(path = %path, "no rows to save");
        return Ok(false);
    }
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer
            .serialize(row)
            .map_err(|err| CurateError::Csv(err.to_string()))?;
    }
    let content = writer
        .into_inner()
        .map_err(|err| CurateError::Csv(err.to_string()))?;
    fs_util::write_atomic(path, &content)?;
    tracing::info!(path = %path, rows = rows.len(), "saved CSV");
    Ok(true)
}

pub fn read_csv<T: DeserializeOwned>(path: &Utf8Path) -> Result<Vec<T>, CurateError> {
    let file = File::open(path.as_std_path())
        .map_err(|err| CurateError::Filesystem(format!("open {path}: {err}")))?;
    read_csv_from(file)
}

pub fn read_csv_from<T: DeserializeOwned, R: Read>(reader: R) -> Result<Vec<T>, CurateError> {
    csv::Reader::from_reader(reader)
        .deserialize()
        .map(|row| row.map_err(|err| CurateError::Csv(err.to_string())))
        .collect()
}

pub fn write_lines<I>(path: &Utf8Path, lines: I) -> Result<(), CurateError>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    let content = lines
        .into_iter()
        .map(|line| line.as_ref().to_string())
        .collect::<Vec<_>>()
        .join("\n");
    fs_util::write_atomic(path, content.as_bytes())
}
