use litcurate::agent::{
    AnnotationAgent, CommandAgent, GeneVerdict, PromptVariant, RESEARCH_CATEGORIES,
    SpeciesVerdict, build_species_gene_list, render_prompt,
};
use litcurate::domain::AnnotationRecord;

fn species(name: &str, id: &str) -> SpeciesVerdict {
    SpeciesVerdict {
        species_name: name.to_string(),
        species_id: id.to_string(),
        species_class: "Actinopteri".to_string(),
    }
}

fn gene(name: &str, id: &str) -> GeneVerdict {
    GeneVerdict {
        gene_name: name.to_string(),
        gene_id: id.to_string(),
    }
}

#[test]
fn species_and_genes_form_a_product() {
    let list = build_species_gene_list(
        &[species("Danio rerio", "7955"), species("Oryzias latipes", "8090")],
        &[gene("sox2", "30567"), gene("dmrt1", ""), gene("sox2", "30567")],
    );
    assert_eq!(list.len(), 4);
    assert_eq!(list[0].species_name, "Danio rerio");
    assert_eq!(list[0].gene_name, "sox2");
    assert_eq!(list[1].gene_name, "dmrt1");
    assert_eq!(list[3].species_id, "8090");
    assert_eq!(list[3].species_class, "Actinopteri");
}

#[test]
fn species_without_genes_keep_empty_gene_fields() {
    let list = build_species_gene_list(&[species("Danio rerio", "7955")], &[]);
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].species_id, "7955");
    assert!(list[0].gene_name.is_empty());
    assert!(!list[0].has_gene());
}

#[test]
fn genes_without_species_keep_empty_species_fields() {
    let list = build_species_gene_list(&[], &[gene("sox2", "30567"), gene("pax6a", "30526")]);
    assert_eq!(list.len(), 2);
    assert!(list.iter().all(|entry| entry.species_name.is_empty()));
    assert_eq!(list[1].gene_id, "30526");
}

#[test]
fn nothing_found_is_one_empty_entry() {
    let list = build_species_gene_list(&[], &[]);
    assert_eq!(list.len(), 1);
    assert_eq!(list[0], Default::default());
}

#[test]
fn prompt_carries_paper_and_categories() {
    let mut record = AnnotationRecord::new("39000002".parse().unwrap());
    record.species_name = "Danio rerio".to_string();
    record.gene_name = "sox2".to_string();
    record.title = Some("sox2 expression in fin regeneration".to_string());

    let tool = render_prompt(&record, PromptVariant::ToolAugmented);
    let plain = render_prompt(&record, PromptVariant::Plain);

    assert!(tool.contains("PMID: 39000002\n"));
    assert!(tool.contains("Title: sox2 expression in fin regeneration"));
    assert!(tool.contains("PubTator species hint: Danio rerio"));
    for category in RESEARCH_CATEGORIES {
        assert!(tool.contains(category), "{category} missing");
        assert!(plain.contains(category), "{category} missing");
    }
    assert!(tool.contains("lookup tool"));
    assert!(!plain.contains("lookup tool"));
}

#[cfg(unix)]
#[test]
fn command_agent_reads_reply_from_stdout() {
    let agent = CommandAgent::new(
        "sh",
        vec![
            "-c".to_string(),
            r#"cat > /dev/null; echo '{"transcript":["thinking"],"verdict":{"species":[{"species_name":"Danio rerio"}],"gene_research_type":["Functional Annotation"]},"usage":{"input_tokens":12,"output_tokens":3}}'"#.to_string(),
        ],
    );
    let reply = agent.annotate("PMID: 1\n").unwrap();

    assert_eq!(reply.transcript, vec!["thinking"]);
    let verdict = reply.verdict.unwrap();
    assert_eq!(verdict.species[0].species_name, "Danio rerio");
    assert!(verdict.genes.is_empty());
    assert_eq!(verdict.gene_research_types, vec!["Functional Annotation"]);
    assert_eq!(reply.usage.total_tokens(), 15);
}

#[cfg(unix)]
#[test]
fn command_agent_failure_is_an_error() {
    let agent = CommandAgent::new("sh", vec!["-c".to_string(), "exit 3".to_string()]);
    assert!(agent.annotate("PMID: 1\n").is_err());
}
