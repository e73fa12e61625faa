//! Bounded cursor over an untrusted byte range.
//!
//! A [`Cursor`] carries `(pos, limit)` over a borrowed slice. Every advance
//! is checked against `limit`, and `limit` is clamped to the slice length at
//! construction, so no primitive here can read past the declared input.
//!
//! Field lookup is deliberately shallow: a key matches only when it starts
//! the buffer or follows `,`, `{` or a newline (spaces, tabs and carriage
//! returns in between are skipped), and is followed by `:` or a space. That
//! keeps a key name quoted inside a string value from matching, at the cost
//! of not understanding nested objects with colliding keys.

/// Read-only cursor over `buf[..limit]`.
#[derive(Clone, Copy, Debug)]
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
    limit: usize,
}

impl<'a> Cursor<'a> {
    /// Creates a cursor at offset 0. `limit` is clamped to `buf.len()`.
    pub fn new(buf: &'a [u8], limit: usize) -> Self {
        Self {
            buf,
            pos: 0,
            limit: limit.min(buf.len()),
        }
    }

    pub fn pos(&self) -> usize {
        self.pos
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.limit
    }

    /// Byte under the cursor, or `None` at the limit.
    pub fn peek(&self) -> Option<u8> {
        if self.pos < self.limit {
            self.buf.get(self.pos).copied()
        } else {
            None
        }
    }

    /// Advances one byte. No-op at the limit.
    pub fn bump(&mut self) {
        if self.pos < self.limit {
            self.pos += 1;
        }
    }

    /// Moves to `pos`, saturating at the limit.
    pub fn seek(&mut self, pos: usize) {
        self.pos = pos.min(self.limit);
    }

    /// The unread bytes `buf[pos..limit]`.
    pub fn rest(&self) -> &'a [u8] {
        self.buf.get(self.pos..self.limit).unwrap_or(&[])
    }

    /// Advances `n` bytes, saturating at the limit.
    pub fn advance(&mut self, n: usize) {
        self.pos = self.pos.saturating_add(n).min(self.limit);
    }

    /// Advances while `pred` holds for the current byte.
    pub fn skip_while(&mut self, pred: impl Fn(u8) -> bool) {
        while let Some(b) = self.peek() {
            if !pred(b) {
                break;
            }
            self.pos += 1;
        }
    }

    /// Advances to the next occurrence of `needle` (cursor left on it).
    /// Returns `false` and parks at the limit when absent.
    pub fn seek_byte(&mut self, needle: u8) -> bool {
        match self.rest().iter().position(|&b| b == needle) {
            Some(off) => {
                self.pos += off;
                true
            }
            None => {
                self.pos = self.limit;
                false
            }
        }
    }

    /// Finds `key` (already quoted, e.g. `b"\"votes\""`) and returns a cursor
    /// positioned on its value, past the `:` and any space/tab/CR/LF.
    pub fn find_field(&self, key: &[u8]) -> Option<Cursor<'a>> {
        let offset = find_field(self.rest(), self.limit - self.pos, key)?;
        let mut found = *self;
        found.pos += offset;
        Some(found)
    }
}

fn is_key_boundary(b: u8) -> bool {
    matches!(b, b',' | b'{' | b'\n')
}

/// True when `hay[..at]` is empty or ends in a key boundary followed only by
/// spaces, tabs or carriage returns.
fn starts_field(hay: &[u8], at: usize) -> bool {
    match hay[..at].iter().rposition(|&b| !matches!(b, b' ' | b'\t' | b'\r')) {
        None => true,
        Some(i) => is_key_boundary(hay[i]),
    }
}

fn is_value_gap(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n')
}

/// Locates a labelled field in `haystack[..limit]`.
///
/// Returns the offset of the first value byte, or `None` when the key does
/// not occur in field position. Never reads at or beyond `limit`.
pub fn find_field(haystack: &[u8], limit: usize, key: &[u8]) -> Option<usize> {
    let limit = limit.min(haystack.len());
    let hay = haystack.get(..limit)?;
    if key.is_empty() || key.len() > limit {
        return None;
    }

    let mut from = 0;
    while let Some(rel) = hay.get(from..)?.windows(key.len()).position(|w| w == key) {
        let at = from + rel;
        let after = at + key.len();

        let preceded = starts_field(hay, at);
        let followed = matches!(hay.get(after), Some(b':' | b' '));

        if preceded && followed {
            let colon = after + hay.get(after..)?.iter().position(|&b| b == b':')?;
            let mut value = colon + 1;
            while hay.get(value).copied().is_some_and(is_value_gap) {
                value += 1;
            }
            return Some(value);
        }
        from = after;
    }
    None
}
