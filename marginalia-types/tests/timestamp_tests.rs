use marginalia_types::{Note, Severity, Timestamp};
use std::time::Duration;

#[test]
fn now_is_after_2020() {
    // 2020-01-01T00:00:00Z
    assert!(Timestamp::now().as_millis() > 1_577_836_800_000);
}

#[test]
fn saturating_add_moves_forward() {
    let t = Timestamp::from_millis(1_000);
    assert_eq!(t.saturating_add(Duration::from_millis(250)).as_millis(), 1_250);
}

#[test]
fn saturating_add_does_not_overflow() {
    let t = Timestamp::from_millis(u64::MAX - 1);
    assert_eq!(t.saturating_add(Duration::from_secs(10)).as_millis(), u64::MAX);
}

#[test]
fn millis_since_is_clamped() {
    let a = Timestamp::from_millis(100);
    let b = Timestamp::from_millis(400);
    assert_eq!(b.millis_since(a), 300);
    assert_eq!(a.millis_since(b), 0);
}

#[test]
fn has_passed_is_inclusive() {
    let deadline = Timestamp::from_millis(500);
    assert!(!deadline.has_passed(Timestamp::from_millis(499)));
    assert!(deadline.has_passed(Timestamp::from_millis(500)));
    assert!(deadline.has_passed(Timestamp::from_millis(501)));
}

#[test]
fn timestamp_serializes_as_number() {
    let json = serde_json::to_string(&Timestamp::from_millis(42)).unwrap();
    assert_eq!(json, "42");
}

#[test]
fn unsaved_note_has_no_id() {
    let note = Note::unsaved("Draft", "body", Some("inbox"));
    assert!(!note.is_saved());
    assert_eq!(note.folder.as_deref(), Some("inbox"));
}

#[test]
fn note_uses_camel_case_fields() {
    let note = Note::unsaved("Draft", "", None);
    let value = serde_json::to_value(&note).unwrap();
    assert!(value.get("createdAt").is_some());
    assert!(value.get("folder").is_none());
}

#[test]
fn severity_parses_lowercase() {
    let s: Severity = serde_json::from_str("\"warning\"").unwrap();
    assert_eq!(s, Severity::Warning);
    assert_eq!(Severity::default(), Severity::Info);
}
