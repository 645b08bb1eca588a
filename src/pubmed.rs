use std::collections::{HashMap, HashSet};

use crate::domain::{DateWindow, PaperMetadata, Pmid};
use crate::error::CurateError;
use crate::ncbi::{NcbiClient, SearchQuery};
use crate::xml::{self, Element};

/// Open-access journal articles only.
pub const OPEN_ACCESS_TERM: &str =
    "all[filter] AND pubmed pmc open access[filter] AND journal article[pt]";
pub const SEARCH_RETMAX: u32 = 10_000;

/// Ids from an `esearch` result, in the order returned. Entries that are not
/// PubMed IDs are dropped.
pub fn parse_id_list(xml: &str) -> Result<Vec<String>, CurateError> {
    let root = xml::parse(xml)?;
    Ok(root
        .find_all("IdList/Id")
        .into_iter()
        .map(Element::text)
        .filter(|id| !id.is_empty())
        .collect())
}

pub fn parse_pmid_list(xml: &str) -> Result<Vec<Pmid>, CurateError> {
    Ok(parse_id_list(xml)?
        .into_iter()
        .filter_map(|id| id.parse().ok())
        .collect())
}

/// Title, abstract and MeSH descriptors for each `PubmedArticle` of an
/// `efetch` response, keyed by PMID.
pub fn parse_article_set(xml: &str) -> Result<HashMap<Pmid, PaperMetadata>, CurateError> {
    let root = xml::parse(xml)?;
    let mut metadata = HashMap::new();
    for article in root.iter().into_iter().filter(|e| e.name == "PubmedArticle") {
        let descendants = article.descendants();
        let Some(pmid) = descendants
            .iter()
            .find(|e| e.name == "PMID")
            .and_then(|e| e.text().parse::<Pmid>().ok())
        else {
            continue;
        };
        let title = first_inner_text(&descendants, "ArticleTitle");
        let abstract_text = first_inner_text(&descendants, "AbstractText");
        let mesh_terms: Vec<String> = descendants
            .iter()
            .filter(|e| e.name == "MeshHeading")
            .filter_map(|heading| heading.child("DescriptorName"))
            .map(Element::inner_text)
            .collect();
        let mesh = if mesh_terms.is_empty() {
            None
        } else {
            Some(mesh_terms.join("; "))
        };
        metadata.insert(
            pmid,
            PaperMetadata {
                title,
                abstract_text,
                mesh,
            },
        );
    }
    Ok(metadata)
}

fn first_inner_text(elements: &[&Element], name: &str) -> Option<String> {
    elements
        .iter()
        .find(|e| e.name == name)
        .map(|e| e.inner_text())
}

/// One `esearch` call for a date window.
pub fn search_window<N: NcbiClient + ?Sized>(
    client: &N,
    window: &DateWindow,
) -> Result<Vec<Pmid>, CurateError> {
    let query = SearchQuery {
        mindate: Some(window.min_date()),
        maxdate: Some(window.max_date()),
        retmax: Some(SEARCH_RETMAX),
        ..SearchQuery::new("pubmed", OPEN_ACCESS_TERM)
    };
    let body = client.esearch(&query)?;
    let pmids = parse_pmid_list(&body)?;
    tracing::info!(window = %window, count = pmids.len(), "esearch window");
    Ok(pmids)
}

/// One `efetch` call for a chunk of PMIDs.
pub fn fetch_metadata<N: NcbiClient + ?Sized>(
    client: &N,
    chunk: &[Pmid],
) -> Result<HashMap<Pmid, PaperMetadata>, CurateError> {
    let ids: Vec<String> = chunk.iter().map(|pmid| pmid.to_string()).collect();
    let body = client.efetch("pubmed", &ids)?;
    parse_article_set(&body)
}

/// De-duplicates while keeping the first occurrence of each PMID.
pub fn dedup_pmids(pmids: impl IntoIterator<Item = Pmid>) -> Vec<Pmid> {
    let mut seen = HashSet::new();
    pmids
        .into_iter()
        .filter(|pmid| seen.insert(pmid.clone()))
        .collect()
}
