use anyhow::{anyhow, Context, Result};
use std::io::Read;
use std::{fs, path::Path};

/// Reads a file after verifying it is not a symlink and is within `max_bytes`.
///
/// NOTE: narrow TOCTOU window between `symlink_metadata()` and `fs::read()`.
/// Closing it fully requires `O_NOFOLLOW` or `fstat` on the fd. The check
/// still catches accidental symlinks.
pub fn read_validated(path: &Path, max_bytes: u64) -> Result<Vec<u8>> {
    let meta = fs::symlink_metadata(path).with_context(|| format!("stat {}", path.display()))?;
    if meta.file_type().is_symlink() {
        return Err(anyhow!("Refusing to read symlink: {}", path.display()));
    }
    if meta.len() > max_bytes {
        return Err(anyhow!(
            "File too large: {} ({} bytes, max {max_bytes} bytes)",
            path.display(),
            meta.len(),
        ));
    }
    fs::read(path).with_context(|| format!("read {}", path.display()))
}

/// Reads `reader` to the end, failing once more than `max_bytes` arrive.
pub fn read_bounded<R: Read>(reader: R, max_bytes: u64, what: &str) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    reader
        .take(max_bytes.saturating_add(1))
        .read_to_end(&mut buf)
        .with_context(|| format!("read {what}"))?;
    if buf.len() as u64 > max_bytes {
        return Err(anyhow!("Input too large: {what} (max {max_bytes} bytes)"));
    }
    Ok(buf)
}
