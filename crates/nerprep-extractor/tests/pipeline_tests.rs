//! Pipeline Integration Tests
//!
//! Drive the extractor, importer, and BIO exporter over temporary
//! directories with in-process tagger and store doubles.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use nerprep_core::{
    AnnotationRecord, AnnotationStore, EntityTagger, Prediction, Result, ScoredLabel,
    SentenceRecord, TaggedSpan, WritePolicy,
};
use nerprep_extractor::files::{read_records, write_records};
use nerprep_extractor::{
    BioExporter, Extractor, GazetteerTagger, Importer, RuleSentenceSegmenter,
};

// =============================================================================
// Test doubles
// =============================================================================

/// Tags "USS Example" as Ship and counts calls
#[derive(Default)]
struct CountingTagger {
    calls: AtomicUsize,
    sentences: AtomicUsize,
}

#[async_trait]
impl EntityTagger for CountingTagger {
    async fn predict(
        &self,
        sentences: &[String],
        _labels: &[String],
    ) -> Result<Vec<Vec<TaggedSpan>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.sentences.fetch_add(sentences.len(), Ordering::SeqCst);

        Ok(sentences
            .iter()
            .map(|s| match s.find("USS Example") {
                Some(byte) => {
                    let start = s[..byte].chars().count();
                    vec![TaggedSpan::new(
                        start,
                        start + "USS Example".len(),
                        vec![ScoredLabel::new("Boat", 0.2), ScoredLabel::new("Ship", 0.9)],
                    )]
                }
                None => Vec::new(),
            })
            .collect())
    }

    fn name(&self) -> &str {
        "counting"
    }
}

#[derive(Default)]
struct RecordingStore {
    batches: Mutex<Vec<(String, Vec<AnnotationRecord>)>>,
}

#[async_trait]
impl AnnotationStore for RecordingStore {
    async fn log(&self, records: &[AnnotationRecord], dataset: &str) -> Result<()> {
        self.batches
            .lock()
            .unwrap()
            .push((dataset.to_string(), records.to_vec()));
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

fn labels() -> Vec<String> {
    vec!["Aircraft".into(), "Ship".into(), "Boat".into()]
}

fn extractor(tagger: Arc<dyn EntityTagger>, json_dir: &Path) -> Extractor {
    Extractor::new(Arc::new(RuleSentenceSegmenter::new()), tagger, labels(), json_dir)
}

// =============================================================================
// Extraction
// =============================================================================

#[tokio::test]
async fn test_scenario_single_sentence() {
    let data = tempfile::tempdir().unwrap();
    let json = tempfile::tempdir().unwrap();
    std::fs::write(data.path().join("a.txt"), "The ship USS Example arrived.").unwrap();

    let tagger = Arc::new(CountingTagger::default());
    let summary = extractor(tagger.clone(), json.path())
        .process_directory(data.path())
        .await
        .unwrap();

    assert_eq!(summary.files_written, 1);
    assert_eq!(tagger.calls.load(Ordering::SeqCst), 1);

    let records = read_records(&json.path().join("a.txt.json")).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].text, "The ship USS Example arrived.");
    for token in ["ship", "USS", "Example"] {
        assert!(records[0].tokens.iter().any(|t| t == token));
    }
    assert_eq!(records[0].predictions, vec![Prediction::new("Ship", 9, 20)]);
}

#[tokio::test]
async fn test_one_tagger_call_per_file() {
    let data = tempfile::tempdir().unwrap();
    let json = tempfile::tempdir().unwrap();
    std::fs::write(
        data.path().join("report.txt"),
        "The ship USS Example arrived.\nIt stayed two days. Then it left!",
    )
    .unwrap();

    let tagger = Arc::new(CountingTagger::default());
    extractor(tagger.clone(), json.path())
        .process_directory(data.path())
        .await
        .unwrap();

    assert_eq!(tagger.calls.load(Ordering::SeqCst), 1);
    assert_eq!(tagger.sentences.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_rerun_skips_existing_output() {
    let data = tempfile::tempdir().unwrap();
    let json = tempfile::tempdir().unwrap();
    std::fs::write(data.path().join("a.txt"), "The ship USS Example arrived.").unwrap();

    let tagger = Arc::new(CountingTagger::default());
    let ex = extractor(tagger.clone(), json.path());
    ex.process_directory(data.path()).await.unwrap();

    let output = json.path().join("a.txt.json");
    let before = std::fs::read(&output).unwrap();

    // Changing the input must not matter: only existence is checked
    std::fs::write(data.path().join("a.txt"), "Completely different text.").unwrap();
    let summary = ex.process_directory(data.path()).await.unwrap();

    assert_eq!(summary.files_skipped, 1);
    assert_eq!(summary.files_written, 0);
    assert_eq!(tagger.calls.load(Ordering::SeqCst), 1);
    assert_eq!(std::fs::read(&output).unwrap(), before);
}

#[tokio::test]
async fn test_preexisting_output_is_never_overwritten() {
    let data = tempfile::tempdir().unwrap();
    let json = tempfile::tempdir().unwrap();
    std::fs::write(data.path().join("a.txt"), "The ship USS Example arrived.").unwrap();
    std::fs::write(json.path().join("a.txt.json"), "hand-edited").unwrap();

    let tagger = Arc::new(CountingTagger::default());
    extractor(tagger.clone(), json.path())
        .process_directory(data.path())
        .await
        .unwrap();

    assert_eq!(tagger.calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        std::fs::read_to_string(json.path().join("a.txt.json")).unwrap(),
        "hand-edited"
    );
}

#[tokio::test]
async fn test_missing_file_writes_nothing() {
    let json = tempfile::tempdir().unwrap();
    let tagger = Arc::new(CountingTagger::default());
    let ex = extractor(tagger.clone(), json.path());

    let missing = json.path().join("ghost.txt");
    assert!(ex.process_file(&missing).await.unwrap().is_empty());
    assert!(ex.extract_file(&missing).await.unwrap().is_none());
    assert!(!json.path().join("ghost.txt.json").exists());
    assert_eq!(tagger.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_write_policies_for_prediction_free_file() {
    let data = tempfile::tempdir().unwrap();
    std::fs::write(data.path().join("quiet.txt"), "Nothing happened today.").unwrap();
    std::fs::write(data.path().join("empty.txt"), "   \n  ").unwrap();

    // Default: any sentence is enough
    let json = tempfile::tempdir().unwrap();
    let summary = extractor(Arc::new(CountingTagger::default()), json.path())
        .process_directory(data.path())
        .await
        .unwrap();
    assert_eq!(summary.files_written, 1);
    assert_eq!(summary.files_empty, 1);
    assert!(json.path().join("quiet.txt.json").exists());
    assert!(!json.path().join("empty.txt.json").exists());

    // Stricter policy: predictions required
    let json = tempfile::tempdir().unwrap();
    let summary = extractor(Arc::new(CountingTagger::default()), json.path())
        .with_write_policy(WritePolicy::AnyPrediction)
        .process_directory(data.path())
        .await
        .unwrap();
    assert_eq!(summary.files_written, 0);
    assert!(!json.path().join("quiet.txt.json").exists());
}

#[tokio::test]
async fn test_output_dir_is_created_and_flat() {
    let data = tempfile::tempdir().unwrap();
    std::fs::create_dir(data.path().join("2021")).unwrap();
    std::fs::write(
        data.path().join("2021").join("b.txt"),
        "A frigate and a patrol boat sailed.",
    )
    .unwrap();

    let root = tempfile::tempdir().unwrap();
    let json_dir = root.path().join("json");
    let summary = extractor(Arc::new(GazetteerTagger::new()), &json_dir)
        .process_directory(data.path())
        .await
        .unwrap();

    assert_eq!(summary.files_written, 1);
    let records = read_records(&json_dir.join("b.txt.json")).await.unwrap();
    let labels: Vec<&str> = records[0]
        .predictions
        .iter()
        .map(|p| p.label.as_str())
        .collect();
    assert_eq!(labels, vec!["Ship", "Boat"]);
}

#[tokio::test]
async fn test_same_file_name_in_two_dirs_is_written_once() {
    let data = tempfile::tempdir().unwrap();
    for dir in ["east", "west"] {
        std::fs::create_dir(data.path().join(dir)).unwrap();
        std::fs::write(
            data.path().join(dir).join("log.txt"),
            "The ship USS Example arrived.",
        )
        .unwrap();
    }

    let json = tempfile::tempdir().unwrap();
    let tagger = Arc::new(CountingTagger::default());
    let summary = extractor(tagger.clone(), json.path())
        .process_directory(data.path())
        .await
        .unwrap();

    assert_eq!(summary.files_seen, 2);
    assert_eq!(summary.files_written, 1);
    assert_eq!(summary.files_skipped, 1);
    assert_eq!(tagger.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_output_dir_inside_input_tree_is_not_reprocessed() {
    let data = tempfile::tempdir().unwrap();
    std::fs::write(data.path().join("a.txt"), "The ship USS Example arrived.").unwrap();
    let json_dir = data.path().join("json");

    let ex = extractor(Arc::new(CountingTagger::default()), &json_dir);
    let first = ex.process_directory(data.path()).await.unwrap();
    let second = ex.process_directory(data.path()).await.unwrap();

    assert_eq!(first.files_written, 1);
    assert_eq!(second.files_seen, 1);
    assert_eq!(second.files_skipped, 1);
    assert!(!json_dir.join("a.txt.json.json").exists());
}

#[tokio::test]
async fn test_missing_input_root_is_error() {
    let json = tempfile::tempdir().unwrap();
    let result = extractor(Arc::new(CountingTagger::default()), json.path())
        .process_directory(&json.path().join("nope"))
        .await;
    assert!(result.unwrap_err().is_not_found());
}

// =============================================================================
// Import
// =============================================================================

#[tokio::test]
async fn test_import_never_submits_empty_predictions() {
    let json = tempfile::tempdir().unwrap();
    write_records(
        &json.path().join("quiet.txt.json"),
        &[
            SentenceRecord::new("One.", vec!["One".into(), ".".into()], vec![]),
            SentenceRecord::new("Two.", vec!["Two".into(), ".".into()], vec![]),
        ],
    )
    .await
    .unwrap();
    write_records(
        &json.path().join("a.txt.json"),
        &[SentenceRecord::new(
            "USS Example",
            vec!["USS".into(), "Example".into()],
            vec![Prediction::new("Ship", 0, 11)],
        )],
    )
    .await
    .unwrap();
    std::fs::write(json.path().join("notes.md"), "not json").unwrap();

    let store = Arc::new(RecordingStore::default());
    let summary = Importer::new(store.clone(), "military_ner")
        .import_directory(json.path())
        .await
        .unwrap();

    assert_eq!(summary.files_seen, 2);
    assert_eq!(summary.files_submitted, 1);
    assert_eq!(summary.records_submitted, 1);
    assert_eq!(summary.records_dropped, 2);

    let batches = store.batches.lock().unwrap();
    assert_eq!(batches.len(), 1);
    assert!(batches
        .iter()
        .flat_map(|(_, records)| records)
        .all(|r| !r.prediction.is_empty()));
}

#[tokio::test]
async fn test_import_aborts_on_malformed_json() {
    let json = tempfile::tempdir().unwrap();
    std::fs::write(json.path().join("a.json"), "[{\"text\": ").unwrap();
    write_records(
        &json.path().join("b.json"),
        &[SentenceRecord::new("x", vec!["x".into()], vec![Prediction::new("Ship", 0, 1)])],
    )
    .await
    .unwrap();

    let store = Arc::new(RecordingStore::default());
    let result = Importer::new(store.clone(), "military_ner")
        .import_directory(json.path())
        .await;

    assert!(result.is_err());
    // a.json sorts first, so nothing was submitted
    assert!(store.batches.lock().unwrap().is_empty());
}

// =============================================================================
// End to end
// =============================================================================

#[tokio::test]
async fn test_extract_import_and_bio_roundtrip() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let json_dir = out.path().join("json");
    let bio_dir = out.path().join("bio");
    std::fs::write(
        data.path().join("a.txt"),
        "The ship USS Example arrived. Nothing else happened.",
    )
    .unwrap();

    extractor(Arc::new(GazetteerTagger::new()), &json_dir)
        .process_directory(data.path())
        .await
        .unwrap();

    let store = Arc::new(RecordingStore::default());
    let summary = Importer::new(store.clone(), "military_ner")
        .with_agent("tars-ner")
        .import_directory(&json_dir)
        .await
        .unwrap();
    assert_eq!(summary.records_submitted, 1);
    {
        let batches = store.batches.lock().unwrap();
        let record = &batches[0].1[0];
        assert_eq!(record.prediction, vec![Prediction::new("Ship", 9, 20)]);
        assert_eq!(record.prediction_agent.as_deref(), Some("tars-ner"));
    }

    let bio = BioExporter::new(&bio_dir)
        .export_directory(&json_dir)
        .await
        .unwrap();
    assert_eq!(bio.sentences_written, 1);

    let conll = std::fs::read_to_string(bio_dir.join("a.txt.bio")).unwrap();
    assert_eq!(
        conll,
        "The\tO\nship\tO\nUSS\tB-Ship\nExample\tI-Ship\narrived\tO\n.\tO\n\n"
    );
}
