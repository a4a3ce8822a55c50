use rulecache_core::cache::{CheckHistory, LedgerSnapshot};
use rulecache_core::model::CacheKey;
use rulecache_core::registry::parse_checks;
use rulecache_core::scheduler;
use rulecache_core::schema::SchemaSnapshot;
use std::sync::{Arc, Mutex};

#[test]
fn corrupt_history_emits_structured_warning() {
    let buffer = Arc::new(Mutex::new(Vec::new()));
    let buffer_clone = buffer.clone();

    let subscriber = tracing_subscriber::fmt()
        .json()
        .with_writer(move || MockWriter(buffer_clone.clone()))
        .finish();

    let checks =
        parse_checks(r#"[{"check_id": "CHK-001", "check_name": "A", "target_table": "users"}]"#)
            .unwrap();
    let schemas = SchemaSnapshot::from_tables([("users".to_string(), vec!["id".to_string()])]);
    let mut ledger = LedgerSnapshot::new();
    ledger.insert(
        CacheKey::from("CHK-001::A"),
        CheckHistory {
            entries: vec![],
            unreadable: vec![0, 0],
        },
    );

    let schedule = tracing::subscriber::with_default(subscriber, || {
        scheduler::plan(&checks, &schemas, &ledger)
    });
    assert_eq!(schedule.missing.len(), 1);

    let output = String::from_utf8(buffer.lock().unwrap().clone()).unwrap();
    assert!(output.contains("\"event\":\"ledger.corrupt\""), "{}", output);
    assert!(output.contains("\"key\":\"CHK-001::A\""));
    assert!(output.contains("2 unreadable ledger entries"));
    assert!(output.contains("\"level\":\"WARN\""));
}

struct MockWriter(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for MockWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
