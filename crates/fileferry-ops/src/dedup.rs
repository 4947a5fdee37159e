//! Destination name deduplication.

use fileferry_core::{Entry, FileStore};

use crate::{OperationError, OperationResult};

/// Split a name into prefix, existing copy number and extension.
///
/// `"file (10).txt"` becomes `("file", Some(10), ".txt")`. A leading dot does
/// not start an extension.
pub(crate) fn split_name(name: &str) -> (&str, Option<u64>, &str) {
    let (base, ext) = match name.rfind('.') {
        Some(i) if i > 0 => (&name[..i], &name[i..]),
        _ => (name, ""),
    };

    if let Some(inner) = base.strip_suffix(')') {
        if let Some(open) = inner.rfind(" (") {
            let digits = &inner[open + 2..];
            if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
                if let Ok(number) = digits.parse() {
                    return (&inner[..open], Some(number), ext);
                }
            }
        }
    }

    (base, None, ext)
}

/// Find a name for `name` that does not collide with anything in `dir`.
///
/// For "file.txt", tries "file.txt", "file (1).txt", "file (2).txt", etc.
/// A name already carrying a " (N)" marker continues from N+1. Numbering stops
/// at the first name the store reports as not found; any other lookup error
/// is returned. Past `max_copy_number` variants the call fails with
/// [`OperationError::NameExhausted`].
pub async fn deduplicate_path(
    store: &dyn FileStore,
    dir: &Entry,
    name: &str,
    max_copy_number: u64,
) -> OperationResult<String> {
    let (prefix, copy_number, ext) = split_name(name);
    let mut next = match copy_number {
        Some(n) => n.checked_add(1),
        None => Some(1),
    };

    let mut trial = name.to_string();
    let mut tried = 0u64;
    loop {
        match store.resolve(dir, &trial).await {
            Ok(_) => {}
            Err(error) if error.is_not_found() => return Ok(trial),
            Err(error) => return Err(error.into()),
        }

        let exhausted = || OperationError::NameExhausted {
            name: name.to_string(),
            limit: max_copy_number,
        };
        if tried >= max_copy_number {
            return Err(exhausted());
        }
        let Some(number) = next else {
            return Err(exhausted());
        };
        trial = format!("{prefix} ({number}){ext}");
        next = number.checked_add(1);
        tried += 1;
    }
}
