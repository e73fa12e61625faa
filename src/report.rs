//! Vote report parsing.
//!
//! The parser is a best-effort scan: it returns every well-formed record it
//! found before the first structural break and reports why it stopped. It
//! never fails on malformed input. The only hard failure is allocating the
//! bounded record array, which happens before any byte is read.
//!
//! Expected shape (key names come from [`FieldSchema`]):
//!
//! ```text
//! {"votes": [{"id": "alice", "choice": "yes", "predicted_yes": 0.6, "predicted_no": 0.4}, ...]}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{ExtractError, ParseGap, TaError};
use crate::extract::{read_decimal, read_quoted_string};
use crate::limits::{CHOICE_CAPACITY, ID_CAPACITY};
use crate::scanner::Cursor;

/// Longest accepted key name, quotes excluded.
pub const MAX_KEY_LEN: usize = 32;

/// Fixed-capacity byte string. At most `CAP - 1` bytes of content; the
/// backing array always holds a NUL after the content.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct FixedText<const CAP: usize> {
    buf: [u8; CAP],
    len: usize,
}

impl<const CAP: usize> FixedText<CAP> {
    pub const CAPACITY: usize = CAP;

    pub fn new() -> Self {
        Self {
            buf: [0; CAP],
            len: 0,
        }
    }

    /// Copies `bytes` in, or returns `None` if they leave no room for the
    /// terminator.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let mut out = Self::new();
        if bytes.len() >= CAP {
            return None;
        }
        out.buf[..bytes.len()].copy_from_slice(bytes);
        out.len = bytes.len();
        Some(out)
    }

    /// Fills from the next quoted string at `cur`.
    fn read_from(cur: &mut Cursor<'_>) -> Result<Self, ExtractError> {
        let mut out = Self::new();
        out.len = read_quoted_string(cur, &mut out.buf)?;
        Ok(out)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<const CAP: usize> Default for FixedText<CAP> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const CAP: usize> fmt::Debug for FixedText<CAP> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", String::from_utf8_lossy(self.as_bytes()))
    }
}

pub type VoterId = FixedText<ID_CAPACITY>;
pub type Choice = FixedText<CHOICE_CAPACITY>;

/// One parsed vote. Immutable once built.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VoterRecord {
    pub id: VoterId,
    pub choice: Choice,
    pub predicted_yes: f32,
    pub predicted_no: f32,
}

impl VoterRecord {
    pub fn voted_yes(&self) -> bool {
        self.choice.as_bytes() == b"yes"
    }
}

/// Ordered, capacity-bounded sequence of records.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VoteBatch {
    records: Vec<VoterRecord>,
    max: usize,
}

impl VoteBatch {
    /// Reserves room for exactly `max` records up front. Pushing never
    /// reallocates afterwards.
    pub fn try_with_capacity(max: usize) -> Result<Self, TaError> {
        let mut records = Vec::new();
        records.try_reserve_exact(max).map_err(|e| {
            TaError::Resource(format!("voter array of {max} records: {e}"))
        })?;
        Ok(Self { records, max })
    }

    /// Appends unless the batch is full. Returns whether the record was kept.
    pub fn push(&mut self, record: VoterRecord) -> bool {
        if self.records.len() >= self.max {
            return false;
        }
        self.records.push(record);
        true
    }

    pub fn is_full(&self) -> bool {
        self.records.len() >= self.max
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn max_records(&self) -> usize {
        self.max
    }

    pub fn records(&self) -> &[VoterRecord] {
        &self.records
    }

    pub fn iter(&self) -> std::slice::Iter<'_, VoterRecord> {
        self.records.iter()
    }
}

impl<'a> IntoIterator for &'a VoteBatch {
    type Item = &'a VoterRecord;
    type IntoIter = std::slice::Iter<'a, VoterRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}

/// Key names for the report fields.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldSchema {
    pub votes: String,
    pub id: String,
    pub choice: String,
    pub predicted_yes: String,
    pub predicted_no: String,
}

impl Default for FieldSchema {
    fn default() -> Self {
        Self {
            votes: "votes".into(),
            id: "id".into(),
            choice: "choice".into(),
            predicted_yes: "predicted_yes".into(),
            predicted_no: "predicted_no".into(),
        }
    }
}

impl FieldSchema {
    /// Key names emitted by the first deployed clients.
    pub fn legacy() -> Self {
        Self {
            votes: "votes".into(),
            id: "user".into(),
            choice: "vote".into(),
            predicted_yes: "prediction_yes".into(),
            predicted_no: "prediction_no".into(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        for (name, key) in self.entries() {
            if key.is_empty() {
                return Err(format!("field key `{name}` is empty"));
            }
            if key.len() > MAX_KEY_LEN {
                return Err(format!(
                    "field key `{name}` is {} bytes (max {MAX_KEY_LEN})",
                    key.len()
                ));
            }
            if key.bytes().any(|b| b == b'"' || b == b'\\' || b.is_ascii_control()) {
                return Err(format!("field key `{name}` contains a quote, backslash or control byte"));
            }
        }
        Ok(())
    }

    fn entries(&self) -> [(&'static str, &str); 5] {
        [
            ("votes", self.votes.as_str()),
            ("id", self.id.as_str()),
            ("choice", self.choice.as_str()),
            ("predicted_yes", self.predicted_yes.as_str()),
            ("predicted_no", self.predicted_no.as_str()),
        ]
    }
}

fn quote(key: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(key.len() + 2);
    out.push(b'"');
    out.extend_from_slice(key.as_bytes());
    out.push(b'"');
    out
}

/// Why the parser stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// No `votes` key in field position. Treated as an empty batch.
    NoVotesField,
    /// The `votes` value does not start with `[`.
    NotAnArray,
    /// The array closed with `]`.
    EndOfArray,
    /// Input ended with no further record.
    EndOfInput,
    /// The batch reached its record limit before the array closed.
    Capacity,
    /// A record was structurally broken; it and everything after it were
    /// dropped.
    Gap(ParseGap),
}

impl StopReason {
    /// True when records may have been dropped.
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Capacity | Self::Gap(_))
    }

    pub fn gap(&self) -> Option<ParseGap> {
        match self {
            Self::Gap(g) => Some(*g),
            _ => None,
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoVotesField => write!(f, "no votes field"),
            Self::NotAnArray => write!(f, "votes is not an array"),
            Self::EndOfArray => write!(f, "end of array"),
            Self::EndOfInput => write!(f, "end of input"),
            Self::Capacity => write!(f, "record limit reached"),
            Self::Gap(gap) => write!(f, "{gap}"),
        }
    }
}

/// Report parser bound to one field schema.
#[derive(Clone, Debug)]
pub struct ReportParser {
    votes: Vec<u8>,
    id: Vec<u8>,
    choice: Vec<u8>,
    predicted_yes: Vec<u8>,
    predicted_no: Vec<u8>,
}

impl Default for ReportParser {
    fn default() -> Self {
        Self::new(&FieldSchema::default())
    }
}

impl ReportParser {
    pub fn new(schema: &FieldSchema) -> Self {
        Self {
            votes: quote(&schema.votes),
            id: quote(&schema.id),
            choice: quote(&schema.choice),
            predicted_yes: quote(&schema.predicted_yes),
            predicted_no: quote(&schema.predicted_no),
        }
    }

    /// Allocates a batch of `max_records` and parses `input` into it.
    pub fn parse(&self, input: &[u8], max_records: usize) -> Result<(VoteBatch, StopReason), TaError> {
        let mut batch = VoteBatch::try_with_capacity(max_records)?;
        let stop = self.parse_into(input, input.len(), &mut batch);
        Ok((batch, stop))
    }

    /// Parses `input[..limit]` into `batch`, stopping at the first broken
    /// record or when `batch` is full.
    pub fn parse_into(&self, input: &[u8], limit: usize, batch: &mut VoteBatch) -> StopReason {
        let stop = self.scan(Cursor::new(input, limit), batch);
        match stop {
            StopReason::Gap(gap) => tracing::warn!(
                parsed = batch.len(),
                reason = %gap,
                "vote report truncated at malformed record"
            ),
            StopReason::Capacity => tracing::warn!(
                parsed = batch.len(),
                "vote report exceeds record limit; remaining records ignored"
            ),
            _ => tracing::debug!(parsed = batch.len(), stop = %stop, "vote report parsed"),
        }
        stop
    }

    fn scan(&self, root: Cursor<'_>, batch: &mut VoteBatch) -> StopReason {
        let Some(mut cur) = root.find_field(&self.votes) else {
            return StopReason::NoVotesField;
        };
        if cur.peek() != Some(b'[') {
            return StopReason::NotAnArray;
        }
        cur.bump();

        loop {
            cur.skip_while(|b| matches!(b, b',' | b' ' | b'\t' | b'\r' | b'\n'));
            match cur.peek() {
                Some(b']') => return StopReason::EndOfArray,
                None => return StopReason::EndOfInput,
                Some(_) => {}
            }
            if batch.is_full() {
                return StopReason::Capacity;
            }
            if !cur.seek_byte(b'{') {
                return StopReason::EndOfInput;
            }

            let Some(span) = record_span(cur.rest()) else {
                return StopReason::Gap(ParseGap::UnterminatedRecord);
            };
            let window = &cur.rest()[..span];
            let record = match self.record(Cursor::new(window, span)) {
                Ok(r) => r,
                Err(gap) => return StopReason::Gap(gap),
            };
            tracing::trace!(index = batch.len(), id = ?record.id, "voter record parsed");
            batch.push(record);
            cur.advance(span);
        }
    }

    fn record(&self, window: Cursor<'_>) -> Result<VoterRecord, ParseGap> {
        let mut at = window
            .find_field(&self.id)
            .ok_or(ParseGap::MissingField("id"))?;
        let id = VoterId::read_from(&mut at).map_err(|cause| ParseGap::BadString { field: "id", cause })?;

        let mut at = window
            .find_field(&self.choice)
            .ok_or(ParseGap::MissingField("choice"))?;
        let choice = Choice::read_from(&mut at).map_err(|cause| ParseGap::BadString {
            field: "choice",
            cause,
        })?;

        let mut at = window
            .find_field(&self.predicted_yes)
            .ok_or(ParseGap::MissingField("predicted_yes"))?;
        let predicted_yes = read_decimal(&mut at);

        let mut at = window
            .find_field(&self.predicted_no)
            .ok_or(ParseGap::MissingField("predicted_no"))?;
        let predicted_no = read_decimal(&mut at);

        Ok(VoterRecord {
            id,
            choice,
            predicted_yes,
            predicted_no,
        })
    }
}

/// Length of the `{ ... }` record starting at `bytes[0]`, closing brace
/// included. Braces inside quoted strings are ignored, and so is the byte
/// after a `\` inside a string; nested objects are skipped by depth. `None`
/// when the record never closes.
fn record_span(bytes: &[u8]) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}
