//! # bts-voting
//!
//! Peer-prediction trust scoring for an isolated execution context.
//!
//! The trusted side receives an untrusted byte buffer holding a vote report,
//! scores every voter on how close their prediction came to the observed
//! yes-ratio, and writes the scores plus an attestation marker into a
//! caller-owned buffer of fixed capacity.
//!
//! ## Security Properties
//!
//! - **`#![forbid(unsafe_code)]`**: No `unsafe` blocks anywhere.
//! - **Bounded reads**: every scan goes through a [`scanner::Cursor`] that
//!   cannot move past its limit.
//! - **Bounded writes**: every output byte goes through
//!   [`serializer::BoundedWriter::append`], which refuses whole fragments
//!   rather than writing past capacity.
//! - **Write-only output**: the caller's output buffer is never read back;
//!   the attestation signs the writer's private copy.
//! - **Bounded work**: record count, input length and output length are
//!   capped by [`limits`]; a policy can lower them but never raise them.
//! - **No raw input in logs**: voter ids appear only at `trace` level.
//!
//! ## Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`limits`] | Capacity ceilings and per-instance limits |
//! | [`scanner`] | Bounded cursor and field lookup |
//! | [`extract`] | Quoted-string and decimal extractors |
//! | [`report`] | Vote report parser |
//! | [`score`] | Prediction-accuracy scores |
//! | [`serializer`] | Bounded output writer |
//! | [`attest`] | Attestation marker placement and verification |
//! | [`crypto`] | Signers and signer registry |
//! | [`dispatch`] | Invocation shape checks and command routing |
//! | [`errors`] | Trusted-side error taxonomy |
//! | [`policy`] | Policy loading and secure defaults |
//! | [`fs_guard`] | Symlink-safe, size-bounded host reads |

#![forbid(unsafe_code)]

/// Capacity constants and the [`limits::Limits`] value derived from policy.
pub mod limits;

/// Cursor over `(buf, pos, limit)`. All trusted-side reads go through it.
pub mod scanner;

/// Field extractors built on the scanner.
pub mod extract;

/// Best-effort vote report parsing into a bounded batch.
pub mod report;

/// Deterministic per-voter scoring.
pub mod score;

/// Capacity-checked output construction.
pub mod serializer;

/// Attestation marker: append after signing, split and verify on the host.
pub mod attest;

/// Attestation signers and their registry.
pub mod crypto;

/// Trusted-app entry point: shape validation, routing, result codes.
pub mod dispatch;

/// Error types for parsing, output and invocation handling.
pub mod errors;

/// Policy model: limits, field names, parse mode and signer selection.
pub mod policy;

/// Symlink-safe, size-bounded file and stream reads for the host CLI.
pub mod fs_guard;

pub use dispatch::{InvokeOutcome, ResultCode, TrustedApp};
pub use policy::BtsPolicy;
