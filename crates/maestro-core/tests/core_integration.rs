#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Wire-format and error-surface checks for the core types.

use maestro_core::*;

// ---------------------------------------------------------------------------
// 1. Outcome serialization keeps the wire field names
// ---------------------------------------------------------------------------

#[test]
fn outcome_serializes_with_wire_names() {
    let outcome = Outcome::success(Payload::new())
        .with_confidence(0.8)
        .with_processing_time(1.5)
        .with_entry("draft", serde_json::json!("Hi there"));

    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["success"], serde_json::json!(true));
    assert_eq!(json["confidence"], serde_json::json!(0.8));
    assert_eq!(json["processing_time"], serde_json::json!(1.5));
    assert_eq!(json["payload"]["draft"], serde_json::json!("Hi there"));
    assert!(json.get("error").is_none());

    let parsed: Outcome = serde_json::from_value(json).unwrap();
    assert_eq!(parsed, outcome);
}

// ---------------------------------------------------------------------------
// 2. Capabilities use lowercase names on the wire
// ---------------------------------------------------------------------------

#[test]
fn capability_wire_names() {
    for cap in Capability::ALL {
        let json = serde_json::to_string(&cap).unwrap();
        assert_eq!(json, format!("\"{}\"", cap.as_str()));
        assert_eq!(cap.to_string().parse::<Capability>().unwrap(), cap);
    }
}

// ---------------------------------------------------------------------------
// 3. Error Display and From impls
// ---------------------------------------------------------------------------

#[test]
fn error_display_and_from_impls() {
    let err = MaestroError::Configuration("unknown strategy 'zigzag'".to_string());
    assert_eq!(err.to_string(), "Configuration error: unknown strategy 'zigzag'");

    let err = MaestroError::WorkerFault("socket closed".to_string());
    assert_eq!(err.to_string(), "Worker fault: socket closed");

    let err = MaestroError::InvalidTransition {
        from: "completed".to_string(),
        to: "running".to_string(),
    };
    assert_eq!(err.to_string(), "Invalid status transition: completed -> running");

    let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
    let err: MaestroError = json_err.into();
    assert!(matches!(err, MaestroError::Json(_)));

    let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
    let err: MaestroError = io_err.into();
    assert!(err.to_string().starts_with("IO error"));
}
