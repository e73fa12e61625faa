//! Field extractors layered on [`Cursor`].
//!
//! Both extractors advance the cursor they are given and never look past its
//! limit. Neither allocates.

use crate::errors::ExtractError;
use crate::scanner::Cursor;

/// Copies the next quoted string into `dest`, followed by a NUL terminator.
///
/// Skips forward to the first `"`, captures bytes up to the next `"`, and
/// returns the captured length. Escapes are not interpreted. Fails with
/// [`ExtractError::Overflow`] when `len + 1 > dest.len()`, in which case
/// `dest` is untouched. On success the cursor sits past the closing quote.
pub fn read_quoted_string(cur: &mut Cursor<'_>, dest: &mut [u8]) -> Result<usize, ExtractError> {
    if !cur.seek_byte(b'"') {
        return Err(ExtractError::Malformed);
    }
    cur.bump();

    let body = cur.rest();
    let Some(len) = body.iter().position(|&b| b == b'"') else {
        cur.seek(cur.limit());
        return Err(ExtractError::Malformed);
    };

    if len >= dest.len() {
        return Err(ExtractError::Overflow {
            needed: len,
            capacity: dest.len(),
        });
    }

    let (captured, terminator) = dest.split_at_mut(len);
    captured.copy_from_slice(&body[..len]);
    if let Some(t) = terminator.first_mut() {
        *t = 0;
    }
    cur.advance(len + 1);
    Ok(len)
}

/// Reads a restricted decimal numeral: digits with optional `.` fraction.
///
/// Leading space/tab/newline is skipped. Integer digits accumulate as
/// `acc * 10 + d`; each fractional digit adds `d * w` with `w` starting at
/// 0.1 and multiplied by 0.1 per digit, all in `f32`. A later `.` is
/// accepted and changes nothing. Scanning stops at the first byte that is
/// neither a digit nor `.`; no sign or exponent is recognised. Returns 0.0
/// when no digits were seen.
pub fn read_decimal(cur: &mut Cursor<'_>) -> f32 {
    cur.skip_while(|b| matches!(b, b' ' | b'\n' | b'\t'));

    let mut result = 0.0f32;
    let mut weight = 0.1f32;
    let mut seen_dot = false;

    while let Some(b) = cur.peek() {
        match b {
            b'.' => seen_dot = true,
            b'0'..=b'9' => {
                let digit = f32::from(b - b'0');
                if seen_dot {
                    result += digit * weight;
                    weight *= 0.1;
                } else {
                    result = result * 10.0 + digit;
                }
            }
            _ => break,
        }
        cur.bump();
    }
    result
}
