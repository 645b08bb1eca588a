use std::collections::HashSet;
use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;

use crate::domain::{AnnotationRecord, DocumentAnnotations, EntityMention, Pmid};
use crate::error::CurateError;
use crate::xml::{self, Element};

pub const PUBTATOR_EXPORT_URL: &str =
    "https://www.ncbi.nlm.nih.gov/research/pubtator3-api/publications/export/biocxml";

pub trait PubtatorClient: Send + Sync {
    /// Returns the bioc-XML export for `pmids` as raw text.
    fn export_biocxml(&self, pmids: &[Pmid]) -> Result<String, CurateError>;
}

#[derive(Clone)]
pub struct PubtatorHttpClient {
    client: Client,
    export_url: String,
}

#[derive(Serialize)]
struct ExportRequest {
    pmids: String,
}

impl PubtatorHttpClient {
    pub fn new(timeout: Duration) -> Result<Self, CurateError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("litcurate/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| CurateError::PubtatorHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| CurateError::PubtatorHttp(err.to_string()))?;
        Ok(Self {
            client,
            export_url: PUBTATOR_EXPORT_URL.to_string(),
        })
    }

    pub fn with_export_url(mut self, export_url: impl Into<String>) -> Self {
        self.export_url = export_url.into();
        self
    }

    fn send_with_retries<F>(
        &self,
        mut make_req: F,
    ) -> Result<reqwest::blocking::Response, CurateError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(CurateError::PubtatorHttp(err.to_string()));
                }
            }
        }
    }
}

impl PubtatorClient for PubtatorHttpClient {
    fn export_biocxml(&self, pmids: &[Pmid]) -> Result<String, CurateError> {
        let body = ExportRequest {
            pmids: join_pmids(pmids),
        };
        let response =
            self.send_with_retries(|| self.client.post(&self.export_url).json(&body))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "PubTator request failed".to_string());
            return Err(CurateError::PubtatorStatus { status, message });
        }
        let text = response
            .text()
            .map_err(|err| CurateError::PubtatorHttp(err.to_string()))?;
        if text.trim().is_empty() {
            return Err(CurateError::EmptyResponse("PubTator export".to_string()));
        }
        Ok(text)
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}

pub fn join_pmids(pmids: &[Pmid]) -> String {
    pmids
        .iter()
        .map(Pmid::as_str)
        .collect::<Vec<_>>()
        .join(",")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Species,
    Gene,
}

/// One `passage/annotation` in document order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mention {
    pub kind: EntityKind,
    pub text: String,
    pub identifier: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BiocDocument {
    pub pmid: Pmid,
    pub mentions: Vec<Mention>,
}

impl BiocDocument {
    fn mentions_of(&self, kind: EntityKind) -> impl Iterator<Item = &Mention> {
        self.mentions.iter().filter(move |mention| mention.kind == kind)
    }

    /// Representative species and gene for the pre-agent table.
    pub fn to_record(&self) -> AnnotationRecord {
        let (species_name, species_id) = representative(self.mentions_of(EntityKind::Species));
        let (gene_name, gene_id) = representative(self.mentions_of(EntityKind::Gene));
        AnnotationRecord {
            species_name,
            species_id,
            gene_name,
            gene_id,
            ..AnnotationRecord::new(self.pmid.clone())
        }
    }

    /// Every distinct (text, identifier) pair, first-seen order.
    pub fn to_document_annotations(&self) -> DocumentAnnotations {
        DocumentAnnotations {
            pmid: self.pmid.clone(),
            species: distinct_mentions(self.mentions_of(EntityKind::Species)),
            genes: distinct_mentions(self.mentions_of(EntityKind::Gene)),
        }
    }
}

/// Most frequent mention text (ties go to the text seen first) and the
/// identifier of its first occurrence, which may be empty. Empty strings when
/// there are no mentions.
pub fn representative<'a>(mentions: impl Iterator<Item = &'a Mention>) -> (String, String) {
    let mut counts: Vec<(&str, usize, Option<&str>)> = Vec::new();
    for mention in mentions {
        match counts.iter_mut().find(|(text, _, _)| *text == mention.text) {
            Some(entry) => entry.1 += 1,
            None => counts.push((mention.text.as_str(), 1, mention.identifier.as_deref())),
        }
    }

    let mut best: Option<&(&str, usize, Option<&str>)> = None;
    for entry in &counts {
        if best.is_none_or(|current| entry.1 > current.1) {
            best = Some(entry);
        }
    }
    match best {
        Some((text, _, identifier)) => (
            text.to_string(),
            identifier.unwrap_or_default().to_string(),
        ),
        None => (String::new(), String::new()),
    }
}

fn distinct_mentions<'a>(mentions: impl Iterator<Item = &'a Mention>) -> Vec<EntityMention> {
    let mut seen = HashSet::new();
    let mut items = Vec::new();
    for mention in mentions {
        let key = (mention.text.clone(), mention.identifier.clone());
        if seen.insert(key) {
            items.push(EntityMention {
                name: mention.text.clone(),
                id: mention.identifier.clone(),
            });
        }
    }
    items
}

/// Parses a bioc-XML collection. Documents whose first `id` is missing or is
/// not a PubMed ID are skipped.
pub fn parse_biocxml(xml: &str) -> Result<Vec<BiocDocument>, CurateError> {
    let root = xml::parse(xml)?;
    let mut documents = Vec::new();
    for document in root.iter().into_iter().filter(|e| e.name == "document") {
        let Some(id) = document.descendants().into_iter().find(|e| e.name == "id") else {
            tracing::debug!("skipping PubTator document without id");
            continue;
        };
        let pmid: Pmid = match id.text().parse() {
            Ok(pmid) => pmid,
            Err(_) => {
                tracing::warn!(id = %id.text(), "skipping PubTator document with invalid id");
                continue;
            }
        };
        let mentions = document
            .descendants()
            .into_iter()
            .filter(|e| e.name == "passage")
            .flat_map(|passage| passage.children_named("annotation"))
            .filter_map(parse_mention)
            .collect();
        documents.push(BiocDocument { pmid, mentions });
    }
    Ok(documents)
}

fn parse_mention(annotation: &Element) -> Option<Mention> {
    let kind = match infon(annotation, "type")?.as_str() {
        "Species" => EntityKind::Species,
        "Gene" => EntityKind::Gene,
        _ => return None,
    };
    let text = annotation.child("text").map(Element::text)?;
    if text.is_empty() {
        return None;
    }
    let identifier = infon(annotation, "identifier").filter(|value| !value.is_empty());
    Some(Mention {
        kind,
        text,
        identifier,
    })
}

fn infon(annotation: &Element, key: &str) -> Option<String> {
    annotation
        .children_named("infon")
        .find(|infon| infon.attr("key") == Some(key))
        .map(Element::text)
}

/// Fetches one chunk and reduces each document to its representative record.
pub fn fetch_records<P: PubtatorClient + ?Sized>(
    client: &P,
    chunk: &[Pmid],
) -> Result<Vec<AnnotationRecord>, CurateError> {
    let body = client.export_biocxml(chunk)?;
    let documents = parse_biocxml(&body)?;
    Ok(documents.iter().map(BiocDocument::to_record).collect())
}

/// Fetches one chunk keeping every distinct mention per document.
pub fn fetch_documents<P: PubtatorClient + ?Sized>(
    client: &P,
    chunk: &[Pmid],
) -> Result<Vec<DocumentAnnotations>, CurateError> {
    let body = client.export_biocxml(chunk)?;
    let documents = parse_biocxml(&body)?;
    Ok(documents
        .iter()
        .map(BiocDocument::to_document_annotations)
        .collect())
}
