use litcurate::domain::Pmid;
use litcurate::pubmed::{dedup_pmids, parse_article_set, parse_pmid_list};

const EFETCH: &str = include_str!("fixtures/pubmed_efetch.xml");
const ESEARCH: &str = include_str!("fixtures/esearch_taxonomy.xml");

fn pmid(value: &str) -> Pmid {
    value.parse().unwrap()
}

#[test]
fn article_set_extracts_title_abstract_and_mesh() {
    let metadata = parse_article_set(EFETCH).unwrap();
    assert_eq!(metadata.len(), 2);

    let first = &metadata[&pmid("39000001")];
    assert_eq!(first.title.as_deref(), Some("Tp53 loss in mouse and rat liver"));
    assert_eq!(first.abstract_text.as_deref(), Some("Hepatocyte Tp53 was deleted."));
    assert_eq!(
        first.mesh.as_deref(),
        Some("Mice; Tumor Suppressor Protein p53")
    );

    let second = &metadata[&pmid("39000002")];
    assert_eq!(
        second.title.as_deref(),
        Some("sox2 expression in Danio rerio fin regeneration")
    );
    assert_eq!(second.abstract_text, None);
    assert_eq!(second.mesh, None);
}

#[test]
fn search_ids_parse_as_pmids() {
    assert_eq!(parse_pmid_list(ESEARCH).unwrap(), vec![pmid("9606")]);
}

#[test]
fn dedup_keeps_first_occurrence() {
    let ids = ["3", "1", "3", "2", "1"].map(pmid);
    let unique = dedup_pmids(ids);
    let rendered: Vec<&str> = unique.iter().map(Pmid::as_str).collect();
    assert_eq!(rendered, vec!["3", "1", "2"]);
}
