use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum CurateError {
    #[error("invalid PubMed ID: {0}")]
    InvalidPmid(String),

    #[error("invalid date (expected YYYYMMDD): {0}")]
    InvalidDate(String),

    #[error("invalid date range: {start} is after {end}")]
    InvalidDateRange { start: String, end: String },

    #[error("species_gene_list for PMID {0} must not be empty")]
    EmptySpeciesGeneList(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("NCBI request failed: {0}")]
    NcbiHttp(String),

    #[error("NCBI returned status {status}: {message}")]
    NcbiStatus { status: u16, message: String },

    #[error("PubTator request failed: {0}")]
    PubtatorHttp(String),

    #[error("PubTator returned status {status}: {message}")]
    PubtatorStatus { status: u16, message: String },

    #[error("empty response from {0}")]
    EmptyResponse(String),

    #[error("malformed XML: {0}")]
    Xml(String),

    #[error("CSV error: {0}")]
    Csv(String),

    #[error("JSON error: {0}")]
    Json(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("annotation agent failed: {0}")]
    Agent(String),

    #[error("failed to launch worker: {0}")]
    WorkerSpawn(String),

    #[error("failed to install Ctrl-C handler: {0}")]
    SignalHandler(String),

    #[error("batch {batch} failed with exit code {code}")]
    #[diagnostic(help("re-run with --start-index {resume_from} to resume"))]
    WorkerFailed {
        batch: usize,
        code: i32,
        resume_from: usize,
    },

    #[error("interrupted during batch {batch}")]
    #[diagnostic(help("re-run with --start-index {resume_from} to resume"))]
    Interrupted { batch: usize, resume_from: usize },

    #[error("{0}")]
    Usage(String),
}
