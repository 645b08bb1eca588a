use std::sync::Mutex;

use assert_matches::assert_matches;

use litcurate::domain::{EntityMention, Pmid};
use litcurate::error::CurateError;
use litcurate::pubtator::{
    PubtatorClient, fetch_documents, fetch_records, join_pmids, parse_biocxml,
};

const BIOCXML: &str = include_str!("fixtures/pubtator_biocxml.xml");

struct MockPubtator {
    body: String,
    requests: Mutex<Vec<String>>,
}

impl MockPubtator {
    fn new(body: &str) -> Self {
        Self {
            body: body.to_string(),
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl PubtatorClient for MockPubtator {
    fn export_biocxml(&self, pmids: &[Pmid]) -> Result<String, CurateError> {
        self.requests.lock().unwrap().push(join_pmids(pmids));
        if self.body.trim().is_empty() {
            return Err(CurateError::EmptyResponse("PubTator export".to_string()));
        }
        Ok(self.body.clone())
    }
}

fn pmids(values: &[&str]) -> Vec<Pmid> {
    values.iter().map(|value| value.parse().unwrap()).collect()
}

#[test]
fn representative_species_and_gene_per_document() {
    let client = MockPubtator::new(BIOCXML);
    let records = fetch_records(&client, &pmids(&["39000001", "39000002", "39000003"])).unwrap();

    assert_eq!(records.len(), 3);
    assert_eq!(records[0].pmid.as_str(), "39000001");
    assert_eq!(records[0].species_name, "mouse");
    assert_eq!(records[0].species_id, "10090");
    assert_eq!(records[0].gene_name, "Tp53");
    assert_eq!(records[0].gene_id, "22059");
    assert_eq!(records[1].species_name, "Danio rerio");
    assert_eq!(records[1].gene_id, "30567");
    assert_eq!(records[2].species_name, "");
    assert_eq!(records[2].gene_name, "");
    assert_eq!(records[2].title, None);

    assert_eq!(
        *client.requests.lock().unwrap(),
        vec!["39000001,39000002,39000003"]
    );
}

#[test]
fn documents_keep_every_distinct_mention() {
    let client = MockPubtator::new(BIOCXML);
    let documents = fetch_documents(&client, &pmids(&["39000001"])).unwrap();

    assert_eq!(
        documents[0].species,
        vec![
            EntityMention {
                name: "mouse".to_string(),
                id: Some("10090".to_string()),
            },
            EntityMention {
                name: "rat".to_string(),
                id: Some("10116".to_string()),
            },
        ]
    );
    assert_eq!(documents[0].genes.len(), 1);
    assert!(documents[2].species.is_empty());
}

#[test]
fn empty_export_is_an_error() {
    let client = MockPubtator::new("  ");
    assert_matches!(
        fetch_records(&client, &pmids(&["1"])),
        Err(CurateError::EmptyResponse(_))
    );
}

#[test]
fn documents_without_pubmed_id_are_skipped() {
    let xml = r#"<collection>
        <document><id>PMC8000000</id><passage><annotation>
            <infon key="type">Species</infon><infon key="identifier">7955</infon><text>zebrafish</text>
        </annotation></passage></document>
        <document><passage><text>no id</text></passage></document>
        <document><id>42</id></document>
    </collection>"#;
    let documents = parse_biocxml(xml).unwrap();
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].pmid.as_str(), "42");
    assert!(documents[0].mentions.is_empty());
}

#[test]
fn representative_id_is_taken_from_first_occurrence_even_when_empty() {
    let xml = r#"<collection><document><id>42</id><passage>
        <annotation><infon key="type">Gene</infon><text>sox9b</text></annotation>
        <annotation><infon key="type">Gene</infon><infon key="identifier">60642</infon><text>sox9b</text></annotation>
        <annotation><infon key="type">Species</infon><infon key="identifier">7955</infon><text>zebrafish</text></annotation>
    </passage></document></collection>"#;
    let client = MockPubtator::new(xml);
    let records = fetch_records(&client, &pmids(&["42"])).unwrap();

    assert_eq!(records[0].gene_name, "sox9b");
    assert_eq!(records[0].gene_id, "");
    assert_eq!(records[0].species_id, "7955");
}
