//! Command dispatch for the trusted app.
//!
//! An [`Invocation`] mirrors what a TEE client hands across the boundary:
//! a command id, a packed parameter-type word and four parameter slots.
//! Both supported commands take exactly one input memref and one output
//! memref; anything else is rejected before a byte of input is read.
//!
//! ```text
//! Idle -> Validating -> Processing -> Responded
//!                   \-> Rejected  -> Responded
//! ```

use std::fmt;
use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::attest::finish_document;
use crate::crypto::registry::SignerRegistry;
use crate::crypto::AttestationSigner;
use crate::errors::TaError;
use crate::limits::Limits;
use crate::policy::{BtsPolicy, ParseMode};
use crate::report::{ReportParser, StopReason, VoteBatch};
use crate::score::score;
use crate::serializer::{write_score_report, BoundedWriter};

/// Fixed response body of the label command, before the marker.
pub const LABEL_PAYLOAD: &[u8] = br#"{"label": "decrypted_label_xyz""#;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum Command {
    ProcessVotes = 0,
    DecryptLabel = 1,
}

impl TryFrom<u32> for Command {
    type Error = TaError;

    fn try_from(id: u32) -> Result<Self, TaError> {
        match id {
            0 => Ok(Self::ProcessVotes),
            1 => Ok(Self::DecryptLabel),
            other => Err(TaError::Shape(format!("unsupported command {other}"))),
        }
    }
}

/// GlobalPlatform parameter kinds, as encoded in one nibble.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum ParamType {
    None = 0,
    ValueInput = 1,
    ValueOutput = 2,
    ValueInout = 3,
    MemrefInput = 5,
    MemrefOutput = 6,
    MemrefInout = 7,
}

impl ParamType {
    fn from_nibble(n: u32) -> Option<Self> {
        Some(match n {
            0 => Self::None,
            1 => Self::ValueInput,
            2 => Self::ValueOutput,
            3 => Self::ValueInout,
            5 => Self::MemrefInput,
            6 => Self::MemrefOutput,
            7 => Self::MemrefInout,
            _ => return None,
        })
    }
}

/// Four parameter kinds packed four bits apiece, slot 0 in the low nibble.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ParamTypes(u32);

impl ParamTypes {
    pub const fn new(p0: ParamType, p1: ParamType, p2: ParamType, p3: ParamType) -> Self {
        Self((p0 as u32) | (p1 as u32) << 4 | (p2 as u32) << 8 | (p3 as u32) << 12)
    }

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Kind of slot `index`, or `None` for an out-of-range slot or an
    /// unassigned nibble value.
    pub fn get(self, index: usize) -> Option<ParamType> {
        if index >= 4 {
            return None;
        }
        ParamType::from_nibble((self.0 >> (index * 4)) & 0xF)
    }
}

/// The only shape either command accepts.
pub const EXPECTED_PARAM_TYPES: ParamTypes = ParamTypes::new(
    ParamType::MemrefInput,
    ParamType::MemrefOutput,
    ParamType::None,
    ParamType::None,
);

/// Caller-owned output buffer. `size` is set to the written length on return.
#[derive(Debug)]
pub struct MemrefOut<'a> {
    pub buffer: &'a mut [u8],
    pub size: usize,
}

#[derive(Debug)]
pub enum Param<'a> {
    None,
    Value { a: u32, b: u32 },
    MemrefInput(&'a [u8]),
    MemrefOutput(MemrefOut<'a>),
}

#[derive(Debug)]
pub struct Invocation<'a> {
    pub command_id: u32,
    pub param_types: ParamTypes,
    pub params: [Param<'a>; 4],
}

impl<'a> Invocation<'a> {
    /// Invocation in the standard input/output shape.
    pub fn new(command_id: u32, input: &'a [u8], output: &'a mut [u8]) -> Self {
        Self {
            command_id,
            param_types: EXPECTED_PARAM_TYPES,
            params: [
                Param::MemrefInput(input),
                Param::MemrefOutput(MemrefOut {
                    buffer: output,
                    size: 0,
                }),
                Param::None,
                Param::None,
            ],
        }
    }

    /// Length the app reported for the output slot.
    pub fn output_size(&self) -> Option<usize> {
        match &self.params[1] {
            Param::MemrefOutput(out) => Some(out.size),
            _ => None,
        }
    }
}

/// Result code returned across the boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResultCode {
    Success,
    BadParameters,
    OutOfMemory,
}

impl ResultCode {
    pub const fn as_u32(self) -> u32 {
        match self {
            Self::Success => 0x0000_0000,
            Self::BadParameters => 0xFFFF_0006,
            Self::OutOfMemory => 0xFFFF_000C,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::BadParameters => "BadParameters",
            Self::OutOfMemory => "OutOfMemory",
        }
    }

    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:#010x})", self.name(), self.as_u32())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchState {
    Idle,
    Validating,
    Processing,
    Rejected,
    Responded,
}

impl DispatchState {
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Validating)
                | (Self::Validating, Self::Processing | Self::Rejected)
                | (Self::Processing, Self::Rejected | Self::Responded)
                | (Self::Rejected, Self::Responded)
        )
    }
}

/// Tracks one invocation through [`DispatchState`].
#[derive(Debug)]
struct Transitions {
    state: DispatchState,
}

impl Transitions {
    fn new() -> Self {
        Self {
            state: DispatchState::Idle,
        }
    }

    fn step(&mut self, next: DispatchState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal dispatch transition {:?} -> {next:?}",
            self.state
        );
        tracing::trace!(from = ?self.state, to = ?next, "dispatch state");
        self.state = next;
    }
}

/// Per-call degradation details for `PROCESS_VOTES`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProcessSummary {
    /// Records the parser accepted.
    pub voters_parsed: usize,
    /// Voters that made it into the output.
    pub voters_scored: usize,
    pub stop: StopReason,
    /// Bounded appends refused for lack of room.
    pub refused_writes: usize,
}

impl ProcessSummary {
    pub fn degraded(&self) -> bool {
        self.stop.is_degraded() || self.refused_writes > 0 || self.voters_scored < self.voters_parsed
    }
}

/// What [`TrustedApp::invoke`] reports back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InvokeOutcome {
    pub code: ResultCode,
    /// Bytes written to the output buffer, terminator excluded.
    pub output_len: usize,
    /// Whether the attestation marker was appended.
    pub attested: bool,
    /// Present for a successful `PROCESS_VOTES`.
    pub summary: Option<ProcessSummary>,
}

impl InvokeOutcome {
    fn failed(code: ResultCode) -> Self {
        Self {
            code,
            output_len: 0,
            attested: false,
            summary: None,
        }
    }

    /// True when a successful call returned less than a full result.
    pub fn degraded(&self) -> bool {
        self.code.is_success() && (!self.attested || self.summary.is_some_and(|s| s.degraded()))
    }
}

/// The trusted side: a parser, limits and a signer. Holds no per-call
/// state, so one instance can serve concurrent invocations.
pub struct TrustedApp {
    limits: Limits,
    parse_mode: ParseMode,
    parser: ReportParser,
    signer: Arc<dyn AttestationSigner>,
}

impl TrustedApp {
    /// Builds an app from `policy`, resolving its signer in `registry`.
    pub fn new(policy: &BtsPolicy, registry: &SignerRegistry) -> Result<Self> {
        let signer = registry
            .get(&policy.signer)
            .map_err(|e| anyhow!("policy signer: {e}"))?;
        Self::with_signer(policy, signer)
    }

    pub fn with_signer(policy: &BtsPolicy, signer: Arc<dyn AttestationSigner>) -> Result<Self> {
        policy.validate()?;
        tracing::debug!(
            signer = signer.signer_id(),
            max_voters = policy.limits.max_voters,
            parse_mode = ?policy.parse_mode,
            "trusted app ready"
        );
        Ok(Self {
            limits: policy.limits,
            parse_mode: policy.parse_mode,
            parser: ReportParser::new(&policy.fields.schema()),
            signer,
        })
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn signer(&self) -> &dyn AttestationSigner {
        self.signer.as_ref()
    }

    /// Handles one invocation. On any non-success code the output slot's
    /// `size` is 0 and nothing was written.
    pub fn invoke(&self, inv: &mut Invocation<'_>) -> InvokeOutcome {
        let command_id = inv.command_id;
        let mut t = Transitions::new();
        t.step(DispatchState::Validating);

        let validated = match Command::try_from(command_id) {
            Ok(command) => self.buffers(inv).map(|(input, out)| (command, input, out)),
            Err(e) => Err(e),
        };
        let (command, input, out) = match validated {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(command = command_id, error = %e, "invocation rejected");
                t.step(DispatchState::Rejected);
                t.step(DispatchState::Responded);
                return InvokeOutcome::failed(e.result_code());
            }
        };

        t.step(DispatchState::Processing);
        out.size = 0;
        let capacity = out.buffer.len().min(self.limits.max_output_len);
        let buffer = &mut out.buffer[..capacity];

        let result = match command {
            Command::ProcessVotes => self.process_votes(input, buffer),
            Command::DecryptLabel => self.decrypt_label(input, buffer),
        };

        match result {
            Ok(outcome) => {
                out.size = outcome.output_len;
                t.step(DispatchState::Responded);
                if outcome.degraded() {
                    tracing::warn!(
                        command = ?command,
                        output_len = outcome.output_len,
                        attested = outcome.attested,
                        "invocation returned a degraded result"
                    );
                }
                outcome
            }
            Err(e) => {
                tracing::warn!(command = ?command, error = %e, "invocation failed");
                t.step(DispatchState::Rejected);
                t.step(DispatchState::Responded);
                InvokeOutcome::failed(e.result_code())
            }
        }
    }

    /// Runs `command_id` over `input` with a fresh output buffer of
    /// `output_capacity` bytes (capped at the output limit). Returns the
    /// written bytes and the outcome.
    pub fn invoke_bytes(&self, command_id: u32, input: &[u8], output_capacity: usize) -> (Vec<u8>, InvokeOutcome) {
        let capacity = output_capacity.min(self.limits.max_output_len);
        let mut output = Vec::new();
        if let Err(e) = output.try_reserve_exact(capacity) {
            tracing::warn!(capacity, error = %e, "output buffer allocation failed");
            return (Vec::new(), InvokeOutcome::failed(ResultCode::OutOfMemory));
        }
        output.resize(capacity, 0);

        let outcome = {
            let mut inv = Invocation::new(command_id, input, &mut output);
            self.invoke(&mut inv)
        };
        output.truncate(outcome.output_len);
        (output, outcome)
    }

    /// Checks the declared and actual parameter shape, then the input size.
    fn buffers<'i, 'a>(&self, inv: &'i mut Invocation<'a>) -> Result<(&'a [u8], &'i mut MemrefOut<'a>), TaError> {
        if inv.param_types != EXPECTED_PARAM_TYPES {
            return Err(TaError::Shape(format!(
                "param types {:#06x}, expected {:#06x}",
                inv.param_types.raw(),
                EXPECTED_PARAM_TYPES.raw()
            )));
        }
        let [p0, p1, p2, p3] = &mut inv.params;
        if !matches!((&*p2, &*p3), (Param::None, Param::None)) {
            return Err(TaError::Shape("slots 2 and 3 must be empty".into()));
        }
        let input: &'a [u8] = match p0 {
            Param::MemrefInput(input) => *input,
            _ => return Err(TaError::Shape("slot 0 must be an input memref".into())),
        };
        let Param::MemrefOutput(out) = p1 else {
            return Err(TaError::Shape("slot 1 must be an output memref".into()));
        };
        if input.len() > self.limits.max_input_len {
            return Err(TaError::Shape(format!(
                "input of {} bytes exceeds limit of {}",
                input.len(),
                self.limits.max_input_len
            )));
        }
        Ok((input, out))
    }

    fn process_votes(&self, input: &[u8], buffer: &mut [u8]) -> Result<InvokeOutcome, TaError> {
        // The voter array is allocated before the output is touched, so an
        // allocation failure leaves the caller's buffer as it was.
        let mut batch = VoteBatch::try_with_capacity(self.limits.max_voters)?;

        let limit = input.iter().position(|&b| b == 0).unwrap_or(input.len());
        let stop = self.parser.parse_into(input, limit, &mut batch);
        if let (ParseMode::Strict, Some(gap)) = (self.parse_mode, stop.gap()) {
            return Err(TaError::ParseGap(gap));
        }

        let table = score(&batch)?;

        let mut w = BoundedWriter::new(buffer)?;
        let voters_scored = write_score_report(&mut w, &table);
        let attested = !w.is_empty() && finish_document(&mut w, self.signer.as_ref());

        let summary = ProcessSummary {
            voters_parsed: batch.len(),
            voters_scored,
            stop,
            refused_writes: w.refused(),
        };
        if summary.refused_writes > 0 {
            tracing::warn!(
                refused = summary.refused_writes,
                voters_scored,
                voters_parsed = summary.voters_parsed,
                capacity = w.capacity(),
                "output capacity too small; result truncated"
            );
        }
        tracing::info!(
            voters_scored,
            stop = %stop,
            output_len = w.len(),
            attested,
            "votes processed"
        );

        Ok(InvokeOutcome {
            code: ResultCode::Success,
            output_len: w.len(),
            attested,
            summary: Some(summary),
        })
    }

    fn decrypt_label(&self, input: &[u8], buffer: &mut [u8]) -> Result<InvokeOutcome, TaError> {
        tracing::debug!(input_len = input.len(), "label request");
        let mut w = BoundedWriter::new(buffer)?;
        let attested = w.append(LABEL_PAYLOAD).is_ok() && finish_document(&mut w, self.signer.as_ref());
        if !attested {
            tracing::warn!(capacity = w.capacity(), output_len = w.len(), "label response degraded");
        }
        Ok(InvokeOutcome {
            code: ResultCode::Success,
            output_len: w.len(),
            attested,
            summary: None,
        })
    }
}
