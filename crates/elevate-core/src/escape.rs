//! Escaping helpers for generated shell text.
//!
//! Every value embedded inside a double-quoted fragment of a generated
//! script (paths, environment values, command text) passes through
//! [`escape_double_quotes`] before assembly. Windows batch `set` lines use
//! [`escape_cmd_meta`] instead, because `cmd.exe` treats quotes as part of
//! the variable value.

/// Replaces every `"` with `\"` so the value can sit inside a double-quoted
/// POSIX shell fragment.
///
/// A string with no quotes is returned unchanged.
#[must_use]
pub fn escape_double_quotes(s: &str) -> String {
    s.replace('"', "\\\"")
}

/// Characters `cmd.exe` treats specially in a `set KEY=value` line.
const CMD_META: [char; 5] = ['<', '>', '|', '&', '^'];

/// Prefixes each of `<`, `>`, `|`, `&`, `^` with the cmd escape character
/// `^` so the value survives a batch `set` line verbatim.
#[must_use]
pub fn escape_cmd_meta(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if CMD_META.contains(&c) {
            out.push('^');
        }
        out.push(c);
    }
    out
}
