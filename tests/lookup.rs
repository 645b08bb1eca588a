use litcurate::domain::{GeneMode, TaxonomyMode};
use litcurate::error::CurateError;
use litcurate::lookup::{LookupClient, TaxonomyInfo, TaxonomyResult};
use litcurate::ncbi::{NcbiClient, SearchQuery};

const ESEARCH_TAXONOMY: &str = include_str!("fixtures/esearch_taxonomy.xml");
const TAXONOMY_9606: &str = include_str!("fixtures/taxonomy_9606.xml");
const GENE_7157: &str = include_str!("fixtures/gene_7157.xml");
const ESUMMARY: &str = include_str!("fixtures/esummary_taxonomy.xml");
const EMPTY_SEARCH: &str = "<eSearchResult><Count>0</Count><IdList/></eSearchResult>";

struct MockNcbi;

impl NcbiClient for MockNcbi {
    fn esearch(&self, query: &SearchQuery) -> Result<String, CurateError> {
        match (query.db.as_str(), query.term.as_str()) {
            ("taxonomy", "Homo sapiens") => Ok(ESEARCH_TAXONOMY.to_string()),
            ("gene", term) if term.contains("txid9606") => Ok(
                "<eSearchResult><IdList><Id>7157</Id></IdList></eSearchResult>".to_string(),
            ),
            _ => Ok(EMPTY_SEARCH.to_string()),
        }
    }

    fn efetch(&self, db: &str, ids: &[String]) -> Result<String, CurateError> {
        match (db, ids.first().map(String::as_str)) {
            ("taxonomy", Some("9606")) => Ok(TAXONOMY_9606.to_string()),
            ("gene", Some("7157")) => Ok(GENE_7157.to_string()),
            _ => Err(CurateError::NcbiStatus {
                status: 400,
                message: "unknown id".to_string(),
            }),
        }
    }

    fn esummary(&self, _db: &str, id: &str) -> Result<String, CurateError> {
        if id == "9606" {
            Ok(ESUMMARY.to_string())
        } else {
            Err(CurateError::EmptyResponse("esummary".to_string()))
        }
    }
}

struct OfflineNcbi;

impl NcbiClient for OfflineNcbi {
    fn esearch(&self, _query: &SearchQuery) -> Result<String, CurateError> {
        Err(CurateError::NcbiHttp("offline".to_string()))
    }

    fn efetch(&self, _db: &str, _ids: &[String]) -> Result<String, CurateError> {
        Err(CurateError::NcbiHttp("offline".to_string()))
    }

    fn esummary(&self, _db: &str, _id: &str) -> Result<String, CurateError> {
        Err(CurateError::NcbiHttp("offline".to_string()))
    }
}

#[test]
fn taxonomy_id_resolves_to_name_and_class() {
    let lookup = LookupClient::new(MockNcbi);
    assert_eq!(
        lookup.resolve_taxonomy("9606", TaxonomyMode::Auto),
        TaxonomyResult::Info(TaxonomyInfo {
            species_name: "Homo sapiens".to_string(),
            class_name: "Mammalia".to_string(),
        })
    );
}

#[test]
fn taxonomy_name_resolves_to_id() {
    let lookup = LookupClient::new(MockNcbi);
    assert_eq!(
        lookup.resolve_taxonomy("Homo sapiens", TaxonomyMode::Auto),
        TaxonomyResult::TaxonomyId("9606".to_string())
    );
    assert_eq!(
        lookup.resolve_taxonomy("Nonexistent beast", TaxonomyMode::NameToId),
        TaxonomyResult::TaxonomyId(String::new())
    );
}

#[test]
fn gene_id_resolves_to_full_info() {
    let lookup = LookupClient::new(MockNcbi);
    let info = lookup.resolve_gene("7157", GeneMode::Auto, None);

    assert_eq!(info.gene_id, "7157");
    assert_eq!(info.gene_name, "TP53");
    assert_eq!(info.description, "tumor protein p53");
    assert_eq!(info.ensembl_id, "ENSG00000141510");
    assert_eq!(info.synonyms, vec!["P53", "LFS1"]);
}

#[test]
fn gene_name_needs_species() {
    let lookup = LookupClient::new(MockNcbi);

    let without_species = lookup.resolve_gene("TP53", GeneMode::Auto, None);
    assert_eq!(without_species.gene_id, "");

    let with_species = lookup.resolve_gene("TP53", GeneMode::Auto, Some("9606"));
    assert_eq!(with_species.gene_id, "7157");
    assert_eq!(with_species.gene_name, "TP53");
}

#[test]
fn gene_search_term_names_gene_and_taxon() {
    let lookup = LookupClient::new(MockNcbi);
    assert_eq!(lookup.gene_id("9606", "TP53"), "7157");
    assert_eq!(lookup.gene_id("7955", "tp53"), "");
}

#[test]
fn id_to_name_returns_locus_only() {
    let lookup = LookupClient::new(MockNcbi);
    let info = lookup.resolve_gene("7157", GeneMode::IdToName, None);
    assert_eq!(info.gene_name, "TP53");
    assert!(info.description.is_empty());
    assert!(info.synonyms.is_empty());
}

#[test]
fn failures_become_empty_results() {
    let lookup = LookupClient::new(OfflineNcbi);
    assert_eq!(
        lookup.resolve_taxonomy("9606", TaxonomyMode::Auto),
        TaxonomyResult::Info(TaxonomyInfo::default())
    );
    assert_eq!(lookup.taxonomy_id("Danio rerio"), "");
    assert_eq!(lookup.resolve_gene("7157", GeneMode::IdToInfo, None).gene_name, "");
    assert_eq!(lookup.summarize_species("Danio rerio"), None);
}

#[test]
fn species_summary_has_names() {
    let lookup = LookupClient::new(MockNcbi);
    let summary = lookup.summarize_species("Homo sapiens").unwrap();
    assert_eq!(summary.taxonomy_id, "9606");
    assert_eq!(summary.scientific_name.as_deref(), Some("Homo sapiens"));
    assert_eq!(summary.common_name.as_deref(), Some("human"));
    assert_eq!(lookup.summarize_species("Unknown organism"), None);
}
