use assert_matches::assert_matches;
use chrono::NaiveDate;

use litcurate::domain::{
    AnnotationRecord, DateWindow, PaperAnnotation, PaperMetadata, Pmid, parse_compact_date,
};
use litcurate::error::CurateError;

#[test]
fn pmid_round_trips_as_string() {
    let pmid: Pmid = serde_json::from_str(r#""39612345""#).unwrap();
    assert_eq!(pmid.as_str(), "39612345");
    assert_eq!(serde_json::to_string(&pmid).unwrap(), r#""39612345""#);
    assert!(serde_json::from_str::<Pmid>(r#""PMC123""#).is_err());
}

#[test]
fn empty_species_gene_list_is_rejected() {
    let pmid: Pmid = "1".parse().unwrap();
    let result = PaperAnnotation::new(pmid, Vec::new(), Vec::new());
    assert_matches!(result, Err(CurateError::EmptySpeciesGeneList(pmid)) if pmid == "1");

    let json = r#"{"pmid": "1", "species_gene_list": [], "gene_research_type": []}"#;
    assert!(serde_json::from_str::<PaperAnnotation>(json).is_err());
}

#[test]
fn missing_metadata_clears_fields() {
    let mut record = AnnotationRecord::new("5".parse().unwrap());
    record.merge_metadata(Some(&PaperMetadata {
        title: Some("A title".to_string()),
        abstract_text: None,
        mesh: Some("Zebrafish".to_string()),
    }));
    assert_eq!(record.title.as_deref(), Some("A title"));
    assert_eq!(record.mesh.as_deref(), Some("Zebrafish"));

    record.merge_metadata(None);
    assert_eq!(record.title, None);
    assert_eq!(record.mesh, None);
}

#[test]
fn date_windows_cover_range() {
    let start = parse_compact_date("20240130").unwrap();
    let end = parse_compact_date("20240205").unwrap();
    let windows = DateWindow::split(start, end, 3).unwrap();

    let rendered: Vec<String> = windows.iter().map(ToString::to_string).collect();
    assert_eq!(
        rendered,
        vec![
            "2024/01/30-2024/02/01",
            "2024/02/02-2024/02/04",
            "2024/02/05-2024/02/05",
        ]
    );
}

#[test]
fn single_day_range_is_one_window() {
    let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    assert_eq!(DateWindow::split(day, day, 3).unwrap().len(), 1);
}

#[test]
fn malformed_dates_are_rejected() {
    assert_matches!(parse_compact_date("2024-01-01"), Err(CurateError::InvalidDate(_)));
    assert_matches!(parse_compact_date("20241301"), Err(CurateError::InvalidDate(_)));
}
