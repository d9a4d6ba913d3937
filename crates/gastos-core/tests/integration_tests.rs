//! Integration tests for gastos-core
//!
//! These tests exercise the full analyze → enrich → persist workflow with
//! scripted engines and temporary storage.

use chrono::{Local, NaiveDate, TimeZone};
use gastos_core::{
    config::CategoryRule,
    models::{EntryMetadata, ExpenseEntry, ManualExpense},
    AnalyzerConfig, Category, CompositeStore, ConfidenceLevel, CsvStore, Engine, Error,
    ExpenseSource, ExpenseStore, MockEngine, ReceiptAnalyzer, SqliteStore,
};

const DIA_TICKET: &str = "GRUPO DIA\n\
SUPERMERCADOS DIA S.A.U.\n\
C/ ALCALA 120 MADRID\n\
FECHA: 07/01/2026 18:42\n\
PAN BARRA 0,65\n\
LECHE ENTERA 1,15\n\
BASE IMPONIBLE 25,36\n\
IVA 4,50\n\
TOTAL A PAGAR 29,86\n\
IMPORTE TARJETA 29,86\n";

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, 10).unwrap()
}

fn analyzer_with(engines: Vec<MockEngine>) -> ReceiptAnalyzer {
    ReceiptAnalyzer::with_engines(
        AnalyzerConfig::default(),
        engines.into_iter().map(Engine::mock).collect(),
    )
    .expect("valid analyzer")
}

// =============================================================================
// Analysis
// =============================================================================

#[tokio::test]
async fn test_grupo_dia_ticket_end_to_end() {
    let analyzer = analyzer_with(vec![
        MockEngine::text("tesseract", DIA_TICKET, 81.0).with_preprocessing(),
        MockEngine::text("easyocr", "GRUPO DIA\nTOTAL 29,86", 70.0),
    ]);

    let record = analyzer
        .analyze_at(b"jpeg bytes".to_vec(), today())
        .await
        .expect("analysis succeeds");

    assert_eq!(record.engine_used(), "tesseract");
    assert_eq!(record.amount().value, 29.86);
    assert!(record.amount().confidence() >= 90);
    assert_eq!(record.date().value, NaiveDate::from_ymd_opt(2026, 1, 7).unwrap());
    assert!(record.date().confidence() >= 70);
    assert_eq!(record.title().value, "GRUPO DIA");
    assert_eq!(record.category().value, Category::Comida);
    assert_eq!(record.confidence_level(), ConfidenceLevel::High);
}

#[tokio::test]
async fn test_one_engine_down_others_carry_on() {
    let analyzer = analyzer_with(vec![
        MockEngine::failing("tesseract", "'tesseract' not found in PATH"),
        MockEngine::text("paddleocr", DIA_TICKET, 90.0),
    ]);

    let record = analyzer.analyze_at(vec![0], today()).await.unwrap();
    assert_eq!(record.engine_used(), "paddleocr");
}

#[tokio::test]
async fn test_every_engine_down() {
    let analyzer = analyzer_with(vec![
        MockEngine::failing("tesseract", "'tesseract' not found in PATH"),
        MockEngine::failing("ollama", "connection refused"),
    ]);

    let err = analyzer.analyze_at(vec![0], today()).await.unwrap_err();
    assert!(matches!(err, Error::TotalExtractionFailure { .. }));
    let message = err.to_string();
    assert!(message.contains("tesseract"));
    assert!(message.contains("ollama"));
}

#[tokio::test]
async fn test_same_image_same_record() {
    let analyzer = analyzer_with(vec![MockEngine::text("tesseract", DIA_TICKET, 81.0)]);
    let first = analyzer.analyze_at(vec![7; 16], today()).await.unwrap();
    let second = analyzer.analyze_at(vec![7; 16], today()).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_custom_category_table() {
    let mut config = AnalyzerConfig::default();
    config.categories = vec![
        CategoryRule::new(Category::Compras, &["alcala"]),
        CategoryRule::new(Category::Comida, &["supermerc"]),
        CategoryRule::new(Category::Otros, &[]),
    ];
    let analyzer = ReceiptAnalyzer::with_engines(
        config,
        vec![Engine::mock(MockEngine::text("t", DIA_TICKET, 80.0))],
    )
    .unwrap();

    let record = analyzer.analyze_at(vec![1], today()).await.unwrap();
    // One match each; the rule listed first wins the tie
    assert_eq!(record.category().value, Category::Compras);
    assert_eq!(record.category().confidence(), 30);
}

// =============================================================================
// Persistence
// =============================================================================

#[tokio::test]
async fn test_analyze_enrich_persist() {
    let dir = tempfile::tempdir().unwrap();
    let store = CompositeStore::new(
        Some(SqliteStore::open(dir.path().join("gastos.db").to_str().unwrap()).unwrap()),
        CsvStore::new(dir.path().join("expenses.csv")),
    );

    let analyzer = analyzer_with(vec![MockEngine::text("tesseract", DIA_TICKET, 81.0)]);
    let record = analyzer.analyze_at(vec![1, 2, 3], today()).await.unwrap();

    let processed_at = Local.with_ymd_and_hms(2026, 1, 10, 9, 15, 0).unwrap();
    let entry = ExpenseEntry::from_record(
        &record,
        None,
        EntryMetadata {
            payer: "Exe".into(),
            telegram_user: Some("exe".into()),
            chat_id: Some(-100_200),
            message_id: Some(77),
            receipt_path: Some("data/receipts/receipt_20260110_091500.jpg".into()),
            receipt_file_id: Some("AgACAgQAAxkBAAIB".into()),
        },
        processed_at,
    );
    store.save_expense(&entry).unwrap();

    let from_db = store.list_expenses(10).unwrap();
    let from_csv = store.csv().list_expenses(10).unwrap();
    assert_eq!(from_db, vec![entry.clone()]);
    assert_eq!(from_csv, vec![entry.clone()]);

    assert_eq!(entry.source, ExpenseSource::Photo);
    assert_eq!(entry.model.as_deref(), Some("tesseract"));
    assert_eq!(entry.processed_at, "2026-01-10 09:15:00");
    assert_eq!(entry.overall_confidence, Some(record.overall_confidence()));
}

#[test]
fn test_manual_expense_persisted_to_csv() {
    let dir = tempfile::tempdir().unwrap();
    let store = CompositeStore::new(None, CsvStore::new(dir.path().join("expenses.csv")));

    let entry = ManualExpense {
        amount: 12.346,
        date: "2026-01-09".into(),
        title: Some("   ".into()),
        category: Category::Transporte,
        payer: "Ceci".into(),
    }
    .into_entry(today(), Local.with_ymd_and_hms(2026, 1, 10, 10, 0, 0).unwrap())
    .unwrap();
    store.save_expense(&entry).unwrap();

    let listed = store.list_expenses(5).unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].amount, 12.35);
    assert_eq!(listed[0].title, "Sin título");
    assert_eq!(listed[0].source, ExpenseSource::Manual);
    assert_eq!(listed[0].model, None);
}
