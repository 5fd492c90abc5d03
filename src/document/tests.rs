use super::*;
use tempfile::TempDir;

#[test]
fn blank_pages_are_skipped_but_numbering_is_kept() {
    let pages = vec![
        "Title page".to_string(),
        "   \n".to_string(),
        "Results page".to_string(),
    ];

    let documents = documents_from_pages("journal.pdf", pages);

    assert_eq!(documents.len(), 2);
    assert_eq!(documents[0].metadata.page, 0);
    assert_eq!(documents[1].metadata.page, 2);
    assert_eq!(documents[1].text, "Results page");
    assert!(documents.iter().all(|d| d.metadata.source == "journal.pdf"));
}

#[test]
fn form_feed_separates_pages() {
    let pages = split_pages("one\x0ctwo\x0cthree");
    assert_eq!(pages, vec!["one", "two", "three"]);
}

#[test]
fn load_text_document() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("notes.txt");
    fs::write(&path, "Page one text\x0cPage two text\x0c\x0cPage four text")
        .expect("should write file");

    let documents = load_document(&path, None).expect("should load text document");

    assert_eq!(documents.len(), 3);
    assert_eq!(documents[0].metadata.source, "notes.txt");
    let pages: Vec<u32> = documents.iter().map(|d| d.metadata.page).collect();
    assert_eq!(pages, vec![0, 1, 3]);
}

#[test]
fn source_override() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("notes.md");
    fs::write(&path, "# Heading\n\nBody").expect("should write file");

    let documents =
        load_document(&path, Some("researchJournal")).expect("should load markdown document");

    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].metadata.source, "researchJournal");
}

#[test]
fn unsupported_extension_is_rejected() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let path = temp_dir.path().join("slides.pptx");
    fs::write(&path, "irrelevant").expect("should write file");

    let result = load_document(&path, None);
    assert!(matches!(result, Err(QaError::Config(_))));
}

#[test]
fn missing_file_is_io_error() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let result = load_document(&temp_dir.path().join("missing.txt"), None);
    assert!(matches!(result, Err(QaError::Io(_))));
}

#[test]
fn garbage_pdf_is_document_error() {
    let result = extract_pdf_pages(b"definitely not a pdf");
    assert!(matches!(result, Err(QaError::Document(_))));
}
