use litcurate::domain::{
    AnnotationRecord, DocumentAnnotations, EntityMention, PaperAnnotation, Pmid, SpeciesGeneEntry,
};
use litcurate::filter::{ExclusionSet, filter_documents, filter_papers, filter_records, summarize};

fn record(pmid: &str, species_name: &str, species_id: &str) -> AnnotationRecord {
    AnnotationRecord {
        species_name: species_name.to_string(),
        species_id: species_id.to_string(),
        ..AnnotationRecord::new(pmid.parse().unwrap())
    }
}

fn mention(name: &str, id: Option<&str>) -> EntityMention {
    EntityMention {
        name: name.to_string(),
        id: id.map(str::to_string),
    }
}

fn pmids(records: &[AnnotationRecord]) -> Vec<&str> {
    records.iter().map(|record| record.pmid.as_str()).collect()
}

#[test]
fn three_stages_in_order() {
    let exclusion = ExclusionSet::new(["Homo sapiens"], ["9606"]);
    let records = vec![
        record("1", "Homo sapiens", "9606"),
        record("2", "Danio rerio", "7955"),
        record("3", "", ""),
        record("4", "human", "9606"),
        record("5", "", "8090"),
    ];

    let outcome = filter_records(records, &exclusion);

    assert_eq!(pmids(&outcome.kept), vec!["2", "5"]);
    assert_eq!(pmids(&outcome.excluded), vec!["1", "4", "3"]);
    assert_eq!(outcome.stats.input, 5);
    assert_eq!(outcome.stats.excluded_by_name, 1);
    assert_eq!(outcome.stats.excluded_by_id, 1);
    assert_eq!(outcome.stats.excluded_by_empty_species, 1);
    assert_eq!(outcome.stats.kept, 2);
}

#[test]
fn exclusion_matches_record_values_exactly() {
    let exclusion = ExclusionSet::from_reader(
        "species_name,NCBI_taxonomy_id\n  Homo sapiens , 9606 \n".as_bytes(),
    )
    .unwrap();
    assert!(exclusion.excludes_name("Homo sapiens"));
    assert!(exclusion.excludes_id("9606"));

    let records = vec![
        record("1", " Homo sapiens ", ""),
        record("2", "homo sapiens", " 9606"),
        record("3", "Homo sapiens", ""),
    ];
    let outcome = filter_records(records, &exclusion);

    assert_eq!(pmids(&outcome.kept), vec!["1", "2"]);
    assert_eq!(outcome.stats.excluded_by_name, 1);
    assert_eq!(outcome.stats.excluded_by_id, 0);
}

#[test]
fn filtering_twice_changes_nothing() {
    let exclusion = ExclusionSet::new(["Mus musculus"], ["10090", "10116"]);
    let records = vec![
        record("10", "Mus musculus", "10090"),
        record("11", "rat", "10116"),
        record("12", "Oryzias latipes", "8090"),
        record("13", "", ""),
    ];

    let first = filter_records(records, &exclusion);
    let second = filter_records(first.kept.clone(), &exclusion);

    assert_eq!(second.kept, first.kept);
    assert!(second.excluded.is_empty());
    assert_eq!(second.stats.kept, second.stats.input);
}

#[test]
fn documents_drop_model_organisms_then_missing_entities() {
    let exclusion = ExclusionSet::new(["Homo sapiens"], ["10090"]);
    let doc = |pmid: &str, species: Vec<EntityMention>, genes: Vec<EntityMention>| {
        DocumentAnnotations {
            pmid: pmid.parse().unwrap(),
            species,
            genes,
        }
    };
    let documents = vec![
        doc(
            "1",
            vec![mention("Danio rerio", Some("7955")), mention("mouse", Some("10090"))],
            vec![mention("sox2", Some("30567"))],
        ),
        doc("2", vec![], vec![mention("sox2", None)]),
        doc("3", vec![mention("Xenopus laevis", Some("8355"))], vec![]),
        doc(
            "4",
            vec![mention("Danio rerio", Some("7955"))],
            vec![mention("pax6a", Some("30526"))],
        ),
        doc("5", vec![mention("Homo sapiens", None)], vec![mention("TP53", None)]),
    ];

    let outcome = filter_documents(documents, &exclusion);
    let ids = |docs: &[DocumentAnnotations]| -> Vec<String> {
        docs.iter().map(|doc| doc.pmid.to_string()).collect()
    };

    assert_eq!(ids(&outcome.excluded_by_model_organism), vec!["1", "5"]);
    assert_eq!(ids(&outcome.excluded_by_no_species), vec!["2"]);
    assert_eq!(ids(&outcome.excluded_by_no_genes), vec!["3"]);
    assert_eq!(ids(&outcome.kept), vec!["4"]);
}

#[test]
fn summary_counts_and_averages() {
    let documents = vec![
        DocumentAnnotations {
            pmid: "1".parse().unwrap(),
            species: vec![mention("Danio rerio", Some("7955"))],
            genes: vec![mention("sox2", None), mention("pax6a", None)],
        },
        DocumentAnnotations {
            pmid: "2".parse().unwrap(),
            species: vec![mention("Danio rerio", Some("7955")), mention("Oryzias latipes", None)],
            genes: vec![],
        },
        DocumentAnnotations {
            pmid: "3".parse().unwrap(),
            species: vec![],
            genes: vec![],
        },
    ];

    let summary = summarize(&documents);

    assert_eq!(summary.total_pmids, 3);
    assert_eq!(summary.pmids_with_species, 2);
    assert_eq!(summary.pmids_with_genes, 1);
    assert_eq!(summary.pmids_with_both, 1);
    assert_eq!(summary.total_species_annotations, 3);
    assert_eq!(summary.total_gene_annotations, 2);
    assert_eq!(summary.avg_species_per_pmid, 1.0);
    assert_eq!(summary.avg_genes_per_pmid, 0.67);
    assert_eq!(summary.unique_species, vec!["Danio rerio", "Oryzias latipes"]);
    assert_eq!(summary.unique_genes, vec!["pax6a", "sox2"]);
    assert_eq!(summary.unique_species_count, 2);
}

#[test]
fn papers_need_a_gene_and_no_model_organism() {
    let exclusion = ExclusionSet::new(["Mus musculus"], ["9606"]);
    let entry = |species_name: &str, species_id: &str, gene_name: &str| SpeciesGeneEntry {
        species_name: species_name.to_string(),
        species_id: species_id.to_string(),
        gene_name: gene_name.to_string(),
        ..SpeciesGeneEntry::default()
    };
    let paper = |pmid: &str, entries: Vec<SpeciesGeneEntry>| {
        PaperAnnotation::new(pmid.parse::<Pmid>().unwrap(), entries, Vec::new()).unwrap()
    };
    let papers = vec![
        paper("1", vec![entry("Danio rerio", "7955", "sox2"), entry("Homo sapiens", "9606", "SOX2")]),
        paper("2", vec![entry("Danio rerio", "7955", "")]),
        paper("3", vec![entry("Oryzias latipes", "8090", "dmrt1")]),
        paper("4", vec![entry("Mus musculus", "", "Sox2")]),
    ];

    let outcome = filter_papers(papers, &exclusion);
    let ids = |papers: &[PaperAnnotation]| -> Vec<String> {
        papers.iter().map(|paper| paper.pmid.to_string()).collect()
    };

    assert_eq!(ids(&outcome.excluded_by_model_organism), vec!["1", "4"]);
    assert_eq!(ids(&outcome.excluded_by_no_gene), vec!["2"]);
    assert_eq!(ids(&outcome.kept), vec!["3"]);
}
