//! End-to-end invocation tests against the library entry point.
//!
//! Each test builds a `TrustedApp` the way the host does and checks the
//! exact bytes a client would receive.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use std::sync::Arc;

use bts_voting::attest::{split_attested_output, verify_attested_output};
use bts_voting::crypto::providers::ed25519::Ed25519Signer;
use bts_voting::crypto::providers::placeholder::{PlaceholderSigner, PLACEHOLDER_SIGNATURE};
use bts_voting::crypto::registry::default_registry;
use bts_voting::crypto::SigningSeed;
use bts_voting::dispatch::{Command, Invocation};
use bts_voting::errors::ParseGap;
use bts_voting::policy::{FieldPreset, FieldsConfig, ParseMode};
use bts_voting::report::StopReason;
use bts_voting::{BtsPolicy, ResultCode, TrustedApp};

const PROCESS: u32 = Command::ProcessVotes as u32;
const LABEL: u32 = Command::DecryptLabel as u32;

fn vote(id: &str, choice: &str, py: &str, pn: &str) -> String {
    format!(r#"{{"id": "{id}", "choice": "{choice}", "predicted_yes": {py}, "predicted_no": {pn}}}"#)
}

fn report(records: &[String]) -> String {
    format!(r#"{{"votes": [{}]}}"#, records.join(", "))
}

fn placeholder_app(policy: &BtsPolicy) -> TrustedApp {
    TrustedApp::with_signer(policy, Arc::new(PlaceholderSigner)).unwrap()
}

fn default_app() -> TrustedApp {
    TrustedApp::new(&BtsPolicy::default(), &default_registry(None)).unwrap()
}

#[test]
fn two_voters_half_split_score_full() {
    let input = report(&[vote("alice", "yes", "0.5", "0.5"), vote("bob", "no", "0.5", "0.5")]);
    let (out, outcome) = default_app().invoke_bytes(PROCESS, input.as_bytes(), 4096);
    assert_eq!(outcome.code, ResultCode::Success);
    assert_eq!(
        String::from_utf8(out).unwrap(),
        r#"{"user_scores": {"alice": 100, "bob": 100}, "signature": "FAKE_SIGNATURE_FROM_TA"}"#
    );
}

#[test]
fn four_voter_fixture() {
    // yes-ratio 3/4
    let input = report(&[
        vote("alice", "yes", "0.75", "0.25"),
        vote("bob", "yes", "0.5", "0.5"),
        vote("carol", "yes", "0", "1"),
        vote("dave", "no", "1", "0"),
    ]);
    let (out, outcome) = default_app().invoke_bytes(PROCESS, input.as_bytes(), 4096);
    assert_eq!(
        String::from_utf8(out).unwrap(),
        r#"{"user_scores": {"alice": 100, "bob": 75, "carol": 25, "dave": 75}, "signature": "FAKE_SIGNATURE_FROM_TA"}"#
    );
    assert!(!outcome.degraded());
}

#[test]
fn empty_votes_array() {
    let (out, outcome) = default_app().invoke_bytes(PROCESS, br#"{"votes": []}"#, 4096);
    assert_eq!(outcome.code, ResultCode::Success);
    assert_eq!(
        out,
        br#"{"user_scores": {}, "signature": "FAKE_SIGNATURE_FROM_TA"}"#
    );
    assert_eq!(outcome.summary.unwrap().stop, StopReason::EndOfArray);
}

#[test]
fn missing_votes_field_is_empty_batch() {
    let (out, outcome) = default_app().invoke_bytes(PROCESS, br#"{"ballots": []}"#, 4096);
    assert_eq!(outcome.code, ResultCode::Success);
    assert!(out.starts_with(br#"{"user_scores": {}"#));
    assert!(!outcome.degraded());
}

#[test]
fn label_stub_ignores_input() {
    let app = default_app();
    let (a, _) = app.invoke_bytes(LABEL, b"anything", 256);
    let (b, outcome) = app.invoke_bytes(LABEL, b"", 256);
    assert_eq!(a, b);
    assert_eq!(outcome.code, ResultCode::Success);
    let parts = split_attested_output(&a).unwrap();
    assert_eq!(parts.payload, br#"{"label": "decrypted_label_xyz""#);
    assert_eq!(parts.rendered, PLACEHOLDER_SIGNATURE);
}

#[test]
fn repeated_invocations_are_identical() {
    let input = report(&[
        vote("x", "no", "0.1", "0.9"),
        vote("y", "yes", "0.37", "0.63"),
        vote("z", "yes", "0.91", "0.09"),
    ]);
    let app = default_app();
    let first = app.invoke_bytes(PROCESS, input.as_bytes(), 4096);
    let second = app.invoke_bytes(PROCESS, input.as_bytes(), 4096);
    assert_eq!(first, second);
}

#[test]
fn capacity_is_never_exceeded() {
    let records: Vec<String> = (0..50)
        .map(|i| vote(&format!("voter-{i:03}"), if i % 3 == 0 { "yes" } else { "no" }, "0.4", "0.6"))
        .collect();
    let input = report(&records);
    let app = default_app();
    let (full, _) = app.invoke_bytes(PROCESS, input.as_bytes(), 65536);
    for cap in [0, 1, 17, 18, 19, 64, 200, 512, full.len(), full.len() + 1] {
        let (out, outcome) = app.invoke_bytes(PROCESS, input.as_bytes(), cap);
        assert_eq!(outcome.code, ResultCode::Success);
        assert!(out.len() < cap.max(1), "cap {cap}: wrote {}", out.len());
        assert_eq!(outcome.output_len, out.len());
    }
    let (exact, outcome) = app.invoke_bytes(PROCESS, input.as_bytes(), full.len() + 1);
    assert_eq!(exact, full);
    assert!(!outcome.degraded());
}

#[test]
fn truncated_output_is_a_voter_prefix() {
    let records: Vec<String> = (0..20).map(|i| vote(&format!("v{i}"), "yes", "1", "0")).collect();
    let input = report(&records);
    let (out, outcome) = default_app().invoke_bytes(PROCESS, input.as_bytes(), 100);
    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with(r#"{"user_scores": {"v0": 100, "v1": 100"#), "{text}");
    assert!(text.ends_with('}'));
    let summary = outcome.summary.unwrap();
    assert!(summary.voters_scored < 20);
    assert_eq!(summary.voters_parsed, 20);
    assert!(outcome.degraded());
}

#[test]
fn truncated_input_scores_complete_records() {
    let full = report(&[
        vote("a", "yes", "0.5", "0.5"),
        vote("b", "no", "0.5", "0.5"),
        vote("c", "no", "0.5", "0.5"),
    ]);
    let cut = &full.as_bytes()[..full.len() - 30];
    let (out, outcome) = default_app().invoke_bytes(PROCESS, cut, 4096);
    assert_eq!(outcome.code, ResultCode::Success);
    assert!(out.starts_with(br#"{"user_scores": {"a": "#));
    let summary = outcome.summary.unwrap();
    assert_eq!(summary.voters_parsed, 2);
    assert_eq!(summary.stop, StopReason::Gap(ParseGap::UnterminatedRecord));
}

#[test]
fn overlong_id_drops_record_not_batch() {
    let long = "L".repeat(64);
    let input = report(&[vote("first", "yes", "1", "0"), vote(&long, "no", "0", "1")]);
    let (out, outcome) = default_app().invoke_bytes(PROCESS, input.as_bytes(), 4096);
    assert_eq!(outcome.code, ResultCode::Success);
    assert!(out.starts_with(br#"{"user_scores": {"first": 100}"#));
    assert!(!String::from_utf8_lossy(&out).contains(&long));
}

#[test]
fn legacy_field_names_via_policy() {
    let policy = BtsPolicy {
        fields: FieldsConfig::Preset(FieldPreset::Legacy),
        ..BtsPolicy::default()
    };
    let input = br#"{"votes": [{"user": "u1", "vote": "yes", "prediction_yes": 1.0, "prediction_no": 0.0}, {"user": "u2", "vote": "no", "prediction_yes": 0.0, "prediction_no": 1.0}]}"#;
    let (out, _) = placeholder_app(&policy).invoke_bytes(PROCESS, input, 4096);
    assert!(out.starts_with(br#"{"user_scores": {"u1": 50, "u2": 50}"#));
}

#[test]
fn strict_mode_rejects_and_writes_nothing() {
    let policy = BtsPolicy {
        parse_mode: ParseMode::Strict,
        ..BtsPolicy::default()
    };
    let app = placeholder_app(&policy);
    let input = report(&[vote("a", "yes", "1", "0"), r#"{"id": "b", "choice": "no"}"#.to_string()]);
    let mut buf = [0xAAu8; 256];
    let mut inv = Invocation::new(PROCESS, input.as_bytes(), &mut buf);
    let outcome = app.invoke(&mut inv);
    assert_eq!(outcome.code, ResultCode::BadParameters);
    assert_eq!(inv.output_size(), Some(0));
    drop(inv);
    assert!(buf.iter().all(|&b| b == 0xAA));

    let clean = report(&[vote("a", "yes", "1", "0")]);
    assert_eq!(app.invoke_bytes(PROCESS, clean.as_bytes(), 256).1.code, ResultCode::Success);
}

#[test]
fn ed25519_attested_output_verifies() {
    let seed = SigningSeed::from_bytes([0x42; 32]);
    let registry = default_registry(Some(&seed));
    let policy = BtsPolicy {
        signer: "ed25519".into(),
        ..BtsPolicy::default()
    };
    let app = TrustedApp::new(&policy, &registry).unwrap();
    let input = report(&[vote("alice", "yes", "0.5", "0.5"), vote("bob", "no", "0.5", "0.5")]);
    let (out, outcome) = app.invoke_bytes(PROCESS, input.as_bytes(), 4096);
    assert!(outcome.attested);

    let public_key = Ed25519Signer::from_seed(&seed).public_key();
    assert!(verify_attested_output(&out, &public_key).unwrap().is_valid());

    let parts = split_attested_output(&out).unwrap();
    assert_eq!(parts.payload, br#"{"user_scores": {"alice": 100, "bob": 100}"#);
    assert_eq!(parts.rendered.len(), 128);

    let other = Ed25519Signer::from_seed(&SigningSeed::from_bytes([0x43; 32])).public_key();
    assert!(!verify_attested_output(&out, &other).unwrap().is_valid());
}

#[test]
fn ed25519_marker_that_does_not_fit_is_reported() {
    let seed = SigningSeed::from_bytes([1; 32]);
    let app = TrustedApp::with_signer(
        &BtsPolicy::default(),
        Arc::new(Ed25519Signer::from_seed(&seed)),
    )
    .unwrap();
    // Room for the empty report, not for a 128-char signature.
    let (out, outcome) = app.invoke_bytes(PROCESS, br#"{"votes": []}"#, 64);
    assert_eq!(outcome.code, ResultCode::Success);
    assert_eq!(out, br#"{"user_scores": {}}"#);
    assert!(!outcome.attested);
    assert!(outcome.degraded());
}

#[test]
fn shape_errors_map_to_bad_parameters() {
    let app = default_app();
    for cmd in [2, 99, u32::MAX] {
        let (out, outcome) = app.invoke_bytes(cmd, b"{}", 64);
        assert_eq!(outcome.code, ResultCode::BadParameters, "command {cmd}");
        assert!(out.is_empty());
    }
}
