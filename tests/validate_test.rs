//! Integration tests for block validation.

use blockq::Error;
use blockq::charset;
use blockq::model::{BlockRecord, BlockStatus};
use blockq::validate::{MAX_TEXT_CHARS, RecordValidator, Rule, sha256_hex};
use serde_json::{Value, json};

fn validator() -> RecordValidator {
    RecordValidator::new().expect("block schema should compile")
}

/// A well-formed block whose recorded size and hash match `text` in
/// `encoding`.
fn block(id: &str, text: &str, encoding: &str, status: &str) -> Value {
    let bytes = charset::encode(encoding, text).expect("fixture text must encode");
    json!({
        "block_id": id,
        "seq": 1,
        "total_seqs": 1,
        "text": text,
        "encoding": encoding,
        "size_bytes": bytes.len(),
        "hash_sha256": sha256_hex(&bytes),
        "status": status,
    })
}

// ---------------------------------------------------------------------------
// Clean blocks
// ---------------------------------------------------------------------------

#[test]
fn intact_block_validates_clean() {
    let value = block("b-0001", "hi", "utf-8", "ok");
    let (record, report) = validator().validate_value(&value, false).unwrap();

    assert_eq!(record.block_id, "b-0001");
    assert_eq!(record.status, BlockStatus::Ok);
    assert!(report.strict);
    assert!(report.is_clean());
    assert_eq!(report.computed_size, 2);
    assert_eq!(
        report.computed_hash,
        "8f434346648f6b96df89dda901c5176b10a6d83961dd3c1ac88b59b2dc327aa4"
    );
}

#[test]
fn non_utf8_charset_is_hashed_in_that_charset() {
    let value = block("b-1251", "Привет", "windows-1251", "ok");
    let (_, report) = validator().validate_value(&value, false).unwrap();

    assert!(report.is_clean());
    assert_eq!(report.encoding_used, "windows-1251");
    assert_eq!(report.computed_size, 6);
}

#[test]
fn validation_is_deterministic() {
    let v = validator();
    let value = block("b-det", "same text", "utf-8", "damaged");
    let (_, first) = v.validate_value(&value, false).unwrap();
    let (_, second) = v.validate_value(&value, false).unwrap();
    assert_eq!(first, second);
}

#[test]
fn integral_float_numbers_are_accepted() {
    let mut value = block("b-float", "hi", "utf-8", "ok");
    value["size_bytes"] = json!(2.0);
    value["seq"] = json!(1.0);
    value["total_seqs"] = json!(2.0);

    let (record, report) = validator().validate_value(&value, false).unwrap();
    assert_eq!(record.size_bytes, 2);
    assert_eq!(record.total_seqs, Some(2));
    assert!(report.is_clean());

    value["size_bytes"] = json!(2.5);
    let err = validator().validate_value(&value, false).unwrap_err();
    assert!(matches!(err, Error::Schema { .. }));
}

#[test]
fn unknown_fields_are_preserved() {
    let mut value = block("b-extra", "hi", "utf-8", "ok");
    value["source_file"] = json!("inbox/a.eml");
    let (record, _) = validator().validate_value(&value, false).unwrap();
    assert_eq!(record.extra.get("source_file"), Some(&json!("inbox/a.eml")));
}

// ---------------------------------------------------------------------------
// Strict vs soft
// ---------------------------------------------------------------------------

#[test]
fn damaged_block_with_wrong_hash_only_warns() {
    let mut value = block("b-0002", "hello", "utf-8", "damaged");
    value["hash_sha256"] = json!("0".repeat(64));

    let (_, report) = validator().validate_value(&value, false).unwrap();
    assert!(!report.strict);
    assert!(report.flagged(Rule::Hash));
    assert_eq!(report.warnings.len(), 1);
}

#[test]
fn ok_block_with_wrong_hash_fails() {
    let mut value = block("b-0003", "hello", "utf-8", "ok");
    value["hash_sha256"] = json!("0".repeat(64));

    let err = validator().validate_value(&value, false).unwrap_err();
    assert_eq!(err.rule(), Some(Rule::Hash));
    match err {
        Error::Integrity { block_id, .. } => assert_eq!(block_id, "b-0003"),
        other => panic!("expected integrity error, got {other:?}"),
    }
}

#[test]
fn ok_blocks_cannot_be_validated_softly() {
    let mut value = block("b-0004", "hi", "utf-8", "ok");
    value["size_bytes"] = json!(100);

    let err = validator().validate_value(&value, false).unwrap_err();
    assert_eq!(err.rule(), Some(Rule::SizeMismatch));

    let record: BlockRecord = serde_json::from_value(value).unwrap();
    let err = validator().validate(&record, false).unwrap_err();
    assert!(matches!(err, Error::Integrity { .. }), "got {err:?}");
}

#[test]
fn strict_can_be_requested_for_damaged_blocks() {
    let mut value = block("b-0005", "hello", "utf-8", "binary");
    value["size_bytes"] = json!(500);

    let (_, report) = validator().validate_value(&value, false).unwrap();
    assert!(!report.strict);
    assert!(report.flagged(Rule::SizeMismatch));

    let err = validator().validate_value(&value, true).unwrap_err();
    assert_eq!(err.rule(), Some(Rule::SizeMismatch));
}

#[test]
fn strict_mode_stops_at_first_flagged_rule() {
    let mut value = block("b-0006", "hello", "utf-8", "ok");
    value["size_bytes"] = json!(500);
    value["hash_sha256"] = json!("0".repeat(64));

    let err = validator().validate_value(&value, false).unwrap_err();
    assert_eq!(err.rule(), Some(Rule::SizeMismatch));
}

#[test]
fn soft_mode_collects_every_rule_in_order() {
    let mut value = block("b-0007", "hello", "utf-8", "damaged");
    value["size_bytes"] = json!(500);
    value["hash_sha256"] = json!("0".repeat(64));
    value["seq"] = json!(4);
    value["total_seqs"] = json!(3);

    let (_, report) = validator().validate_value(&value, false).unwrap();
    let rules: Vec<Rule> = report.warnings.iter().map(|w| w.rule).collect();
    assert_eq!(rules, vec![Rule::SizeMismatch, Rule::Hash, Rule::Sequence]);
}

// ---------------------------------------------------------------------------
// Individual rules
// ---------------------------------------------------------------------------

#[test]
fn size_within_tolerance_is_accepted() {
    let text = "x".repeat(100);
    let mut value = block("b-tol", &text, "utf-8", "ok");
    value["size_bytes"] = json!(108);
    // hash still matches the real bytes
    let (_, report) = validator().validate_value(&value, false).unwrap();
    assert!(report.is_clean());

    value["size_bytes"] = json!(109);
    let err = validator().validate_value(&value, false).unwrap_err();
    assert_eq!(err.rule(), Some(Rule::SizeMismatch));
}

#[test]
fn overlong_text_is_flagged() {
    let text = "a".repeat(MAX_TEXT_CHARS + 1);
    let value = block("b-long", &text, "utf-8", "damaged");
    let (_, report) = validator().validate_value(&value, false).unwrap();
    assert!(report.flagged(Rule::TextLength));
}

#[test]
fn text_length_counts_characters_not_bytes() {
    let text = "é".repeat(MAX_TEXT_CHARS);
    let value = block("b-chars", &text, "utf-8", "ok");
    let (_, report) = validator().validate_value(&value, false).unwrap();
    assert!(report.is_clean());
}

#[test]
fn sequence_out_of_range_is_flagged() {
    for (seq, total) in [(0, 3), (4, 3), (-1, 1)] {
        let mut value = block("b-seq", "hi", "utf-8", "ok");
        value["seq"] = json!(seq);
        value["total_seqs"] = json!(total);
        let err = validator().validate_value(&value, false).unwrap_err();
        assert_eq!(err.rule(), Some(Rule::Sequence), "seq {seq} of {total}");
    }
}

#[test]
fn sequence_is_skipped_when_either_bound_is_missing() {
    let mut value = block("b-noseq", "hi", "utf-8", "ok");
    value["seq"] = Value::Null;
    value["total_seqs"] = json!(3);
    let (_, report) = validator().validate_value(&value, false).unwrap();
    assert!(report.is_clean());
}

// ---------------------------------------------------------------------------
// Encoding fallback
// ---------------------------------------------------------------------------

#[test]
fn unencodable_text_falls_back_to_utf8_in_soft_mode() {
    let text = "café";
    let utf8 = text.as_bytes();
    let value = json!({
        "block_id": "b-enc",
        "text": text,
        "encoding": "ascii",
        "size_bytes": utf8.len(),
        "hash_sha256": sha256_hex(utf8),
        "status": "damaged",
    });

    let (_, report) = validator().validate_value(&value, false).unwrap();
    assert!(report.flagged(Rule::Encoding));
    assert_eq!(report.encoding_used, "utf-8");
    assert_eq!(report.computed_size, utf8.len());
    // size and hash were checked against the UTF-8 bytes
    assert_eq!(report.warnings.len(), 1);
}

#[test]
fn unknown_encoding_fails_in_strict_mode() {
    let mut value = block("b-unk", "hi", "utf-8", "ok");
    value["encoding"] = json!("klingon-8");

    let err = validator().validate_value(&value, false).unwrap_err();
    match err {
        Error::Encoding { encoding, .. } => assert_eq!(encoding, "klingon-8"),
        other => panic!("expected encoding error, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Schema failures
// ---------------------------------------------------------------------------

#[test]
fn schema_failure_is_hard_even_for_damaged_blocks() {
    let mut value = block("b-schema", "hi", "utf-8", "damaged");
    value.as_object_mut().unwrap().remove("hash_sha256");

    let err = validator().validate_value(&value, false).unwrap_err();
    assert!(matches!(err, Error::Schema { .. }), "got {err:?}");
    assert_eq!(err.rule(), None);
}

#[test]
fn invalid_status_is_a_schema_failure() {
    let mut value = block("b-status", "hi", "utf-8", "ok");
    value["status"] = json!("fine");
    let err = validator().validate_value(&value, false).unwrap_err();
    assert!(matches!(err, Error::Schema { .. }));
}

#[test]
fn non_object_is_a_schema_failure() {
    let err = validator().validate_value(&json!([1, 2]), false).unwrap_err();
    assert!(matches!(err, Error::Schema { .. }));
}

#[test]
fn typed_records_are_validated_too() {
    let value = block("b-typed", "hi", "utf-8", "ok");
    let mut record: BlockRecord = serde_json::from_value(value).unwrap();
    assert!(validator().validate(&record, true).unwrap().is_clean());

    record.size_bytes = 99;
    let err = validator().validate(&record, false).unwrap_err();
    assert_eq!(err.rule(), Some(Rule::SizeMismatch));

    record.status = BlockStatus::Damaged;
    let report = validator().validate(&record, false).unwrap();
    assert!(report.flagged(Rule::SizeMismatch));
}

// ---------------------------------------------------------------------------
// Files
// ---------------------------------------------------------------------------

#[test]
fn read_block_validates_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("b-file.json");
    let value = block("b-file", "file text", "utf-8", "ok");
    std::fs::write(&path, serde_json::to_vec(&value).unwrap()).unwrap();

    let (record, report) = validator().read_block(&path).unwrap();
    assert_eq!(record.text, "file text");
    assert!(report.is_clean());
}

#[test]
fn read_block_reports_missing_and_malformed_files() {
    let dir = tempfile::tempdir().unwrap();

    let missing = validator().read_block(dir.path().join("nope.json")).unwrap_err();
    assert!(matches!(missing, Error::Storage { .. }));

    let path = dir.path().join("bad.json");
    std::fs::write(&path, "{not json").unwrap();
    let malformed = validator().read_block(&path).unwrap_err();
    assert!(matches!(malformed, Error::Schema { .. }));
}
