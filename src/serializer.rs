//! Bounded output construction.
//!
//! All output bytes go through [`BoundedWriter::append`]. An append that
//! would leave no room for the trailing NUL is refused whole and the buffer
//! is left as it was, so the written length is always `< capacity`.
//!
//! The caller's buffer is write-only. Every accepted fragment is also kept
//! in a private copy, and [`BoundedWriter::as_bytes`] returns that copy, so
//! what gets signed is what the trusted side wrote, whatever the caller does
//! to its own memory meanwhile.

use std::io::Write as _;

use arrayvec::ArrayVec;

use crate::errors::{Overflow, TaError};
use crate::limits::ID_CAPACITY;
use crate::score::ScoreTable;

/// Scratch size for one `"<id>": <score>` fragment, separator included.
const FRAGMENT_CAPACITY: usize = ID_CAPACITY + 32;

/// Append-only writer over a caller-owned buffer.
pub struct BoundedWriter<'a> {
    out: &'a mut [u8],
    written: Vec<u8>,
    refused: usize,
}

impl<'a> BoundedWriter<'a> {
    /// Reserves the private copy, then zeroes `out`. Nothing is written to
    /// `out` when the reservation fails.
    pub fn new(out: &'a mut [u8]) -> Result<Self, TaError> {
        let mut written = Vec::new();
        written.try_reserve_exact(out.len()).map_err(|e| {
            TaError::Resource(format!("output copy of {} bytes: {e}", out.len()))
        })?;
        out.fill(0);
        Ok(Self {
            out,
            written,
            refused: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.out.len()
    }

    pub fn len(&self) -> usize {
        self.written.len()
    }

    pub fn is_empty(&self) -> bool {
        self.written.is_empty()
    }

    /// Number of appends refused so far.
    pub fn refused(&self) -> usize {
        self.refused
    }

    /// Bytes written so far, terminator excluded. Served from the private
    /// copy, never read back from the caller's buffer.
    pub fn as_bytes(&self) -> &[u8] {
        &self.written
    }

    /// Appends `fragment` if `len + fragment.len() < capacity`, then rewrites
    /// the terminator. Otherwise refuses and changes nothing.
    pub fn append(&mut self, fragment: &[u8]) -> Result<(), Overflow> {
        let len = self.written.len();
        let end = len.saturating_add(fragment.len());
        if end >= self.out.len() {
            self.refused += 1;
            tracing::debug!(
                current = len,
                fragment = fragment.len(),
                capacity = self.out.len(),
                "bounded append refused"
            );
            return Err(Overflow {
                current: len,
                fragment: fragment.len(),
                capacity: self.out.len(),
            });
        }
        self.out[len..end].copy_from_slice(fragment);
        self.out[end] = 0;
        // Within the reservation made in `new`, so this never reallocates.
        self.written.extend_from_slice(fragment);
        Ok(())
    }
}

fn render_entry(separator: bool, id: &[u8], score: i32) -> Option<ArrayVec<u8, FRAGMENT_CAPACITY>> {
    let mut frag = ArrayVec::new();
    if separator {
        frag.try_extend_from_slice(b", ").ok()?;
    }
    frag.try_push(b'"').ok()?;
    frag.try_extend_from_slice(id).ok()?;
    write!(frag, "\": {score}").ok()?;
    Some(frag)
}

/// Writes `{"user_scores": {"<id>": <score>, ...}` in table order.
///
/// Stops emitting voters at the first refused fragment so the list stays a
/// prefix of the table. Returns how many voters were written.
pub fn write_score_report(w: &mut BoundedWriter<'_>, table: &ScoreTable<'_>) -> usize {
    if w.append(b"{\"user_scores\": {").is_err() {
        return 0;
    }

    let mut written = 0;
    for (i, entry) in table.entries().iter().enumerate() {
        let Some(frag) = render_entry(i > 0, entry.id.as_bytes(), entry.score) else {
            break;
        };
        if w.append(&frag).is_err() {
            break;
        }
        written += 1;
    }

    // Closing brace is appended even when voters were cut.
    let _ = w.append(b"}");
    written
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::report::{Choice, VoteBatch, VoterId, VoterRecord};
    use crate::score::score;

    fn batch(ids: &[&str]) -> VoteBatch {
        let mut b = VoteBatch::try_with_capacity(ids.len().max(1)).unwrap();
        for (i, id) in ids.iter().enumerate() {
            b.push(VoterRecord {
                id: VoterId::from_bytes(id.as_bytes()).unwrap(),
                choice: Choice::from_bytes(if i % 2 == 0 { b"yes" } else { b"no" }).unwrap(),
                predicted_yes: 0.5,
                predicted_no: 0.5,
            });
        }
        b
    }

    #[test]
    fn append_within_capacity() {
        let mut buf = [0xFFu8; 8];
        let mut w = BoundedWriter::new(&mut buf).unwrap();
        w.append(b"abc").unwrap();
        w.append(b"de").unwrap();
        assert_eq!(w.as_bytes(), b"abcde");
        assert_eq!(w.len(), 5);
        drop(w);
        assert_eq!(&buf, b"abcde\0\0\0");
    }

    #[test]
    fn append_refuses_when_no_room_for_terminator() {
        let mut buf = [0u8; 4];
        let mut w = BoundedWriter::new(&mut buf).unwrap();
        w.append(b"ab").unwrap();
        let err = w.append(b"cd").unwrap_err();
        assert_eq!(
            err,
            Overflow {
                current: 2,
                fragment: 2,
                capacity: 4
            }
        );
        assert_eq!(w.as_bytes(), b"ab");
        assert_eq!(w.refused(), 1);
        w.append(b"c").unwrap();
        assert_eq!(w.as_bytes(), b"abc");
    }

    #[test]
    fn zero_capacity_refuses_everything() {
        let mut buf: [u8; 0] = [];
        let mut w = BoundedWriter::new(&mut buf).unwrap();
        assert!(w.append(b"").is_err());
        assert!(w.is_empty());
    }

    #[test]
    fn new_zeroes_buffer() {
        let mut buf = [7u8; 5];
        let _ = BoundedWriter::new(&mut buf).unwrap();
        assert_eq!(buf, [0; 5]);
    }

    #[test]
    fn private_copy_ignores_caller_changes() {
        let mut buf = [0u8; 16];
        let mut w = BoundedWriter::new(&mut buf).unwrap();
        w.append(b"abc").unwrap();
        w.out[0] = b'X';
        assert_eq!(w.as_bytes(), b"abc");
        assert_ne!(w.as_bytes().as_ptr(), w.out.as_ptr());
    }

    #[test]
    fn score_report_layout() {
        let b = batch(&["alice", "bob"]);
        let table = score(&b).unwrap();
        let mut buf = [0u8; 256];
        let mut w = BoundedWriter::new(&mut buf).unwrap();
        assert_eq!(write_score_report(&mut w, &table), 2);
        assert_eq!(
            w.as_bytes(),
            br#"{"user_scores": {"alice": 100, "bob": 100}"#
        );
    }

    #[test]
    fn empty_table_layout() {
        let b = batch(&[]);
        let table = score(&b).unwrap();
        let mut buf = [0u8; 64];
        let mut w = BoundedWriter::new(&mut buf).unwrap();
        assert_eq!(write_score_report(&mut w, &table), 0);
        assert_eq!(w.as_bytes(), br#"{"user_scores": {}"#);
    }

    #[test]
    fn small_capacity_cuts_voter_list_as_prefix() {
        let b = batch(&["aaaa", "bbbb", "cccc"]);
        let table = score(&b).unwrap();
        // ratio 2/3 puts everyone at 83. Header (17) + first voter (10) + "}"
        // fits; the second voter does not.
        let mut buf = [0u8; 32];
        let mut w = BoundedWriter::new(&mut buf).unwrap();
        assert_eq!(write_score_report(&mut w, &table), 1);
        assert_eq!(w.as_bytes(), br#"{"user_scores": {"aaaa": 83}"#);
        assert!(w.len() < 32);
    }

    #[test]
    fn render_entry_extremes_fit_scratch() {
        let id = [b'q'; ID_CAPACITY - 1];
        let frag = render_entry(true, &id, i32::MIN).unwrap();
        assert!(frag.ends_with(b"\": -2147483648"));
    }

    #[test]
    fn longest_id_fragment_fits_scratch() {
        let id = "i".repeat(ID_CAPACITY - 1);
        let b = batch(&["x", &id]);
        let table = score(&b).unwrap();
        let mut buf = [0u8; 512];
        let mut w = BoundedWriter::new(&mut buf).unwrap();
        assert_eq!(write_score_report(&mut w, &table), 2);
        assert!(w.as_bytes().ends_with(format!("\"{id}\": 100}}").as_bytes()));
    }
}
