//! Handle encoding for storage sub-keys.
//!
//! Key-value backends may give `.` (and `$`) meaning inside object keys, so
//! handles are percent-encoded before being used as keys. `%` itself is
//! encoded too, which keeps `unescape_handle(escape_handle(x)) == x` for
//! every string.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

/// Bytes that never appear raw in a stored sub-key.
const SUBKEY: &AsciiSet = &CONTROLS.add(b'%').add(b'.').add(b'$');

/// Substitution used by the first storage format.
const LEGACY_DOT: &str = "__DOT__";

/// Encode a handle for use as a storage sub-key.
pub fn escape_handle(handle: &str) -> String {
    utf8_percent_encode(handle, SUBKEY).to_string()
}

/// Decode a sub-key produced by [`escape_handle`].
pub fn unescape_handle(key: &str) -> String {
    percent_decode_str(key).decode_utf8_lossy().into_owned()
}

/// Decode a sub-key written by the legacy `.` -> `__DOT__` format.
pub fn unescape_legacy_handle(key: &str) -> String {
    key.replace(LEGACY_DOT, ".")
}

/// Canonical form of a user-supplied handle (`@user@domain` -> `user@domain`).
pub fn normalize_handle(handle: &str) -> &str {
    handle.trim().trim_start_matches('@')
}
