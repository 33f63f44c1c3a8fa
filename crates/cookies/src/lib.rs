//! Cookie header string codec.
//!
//! Converts between the `name1=value1; name2=value2` form used by `Cookie`
//! headers (and by secret stores that hold a whole session as one string) and
//! structured [`CookieRecord`]s suitable for injection into a browser context.
//!
//! Parsing is deliberately lenient: malformed segments are dropped, not
//! rejected, so that cookie strings copied out of browser devtools or CI
//! secrets keep working even when they carry stray separators.

use serde::{Deserialize, Serialize};

/// Default cookie path attached to every parsed record.
pub const DEFAULT_PATH: &str = "/";

/// A single session cookie scoped to one domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieRecord {
    /// Cookie name. Never empty for records produced by [`parse`].
    pub name: String,
    /// Cookie value. May be empty (`name=` is a valid segment).
    pub value: String,
    /// Domain the cookie is scoped to (e.g. `.zeabur.com`).
    pub domain: String,
    /// Cookie path, `/` unless the browser reports otherwise.
    pub path: String,
}

impl CookieRecord {
    /// Create a record with the default root path.
    pub fn new(
        name: impl Into<String>,
        value: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            domain: domain.into(),
            path: DEFAULT_PATH.to_string(),
        }
    }
}

/// Parse a `name=value; …` cookie string into records scoped to `domain`.
///
/// Each segment is split on the FIRST `=` only, so values containing `=`
/// survive intact. Surrounding whitespace around segments, names, and values
/// is trimmed. Segments without an `=`, and segments whose name trims to
/// empty, are silently skipped. An empty input yields an empty vec.
pub fn parse(cookie_string: &str, domain: &str) -> Vec<CookieRecord> {
    cookie_string
        .split(';')
        .filter_map(|segment| {
            let (name, value) = segment.trim().split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some(CookieRecord::new(name, value.trim(), domain))
        })
        .collect()
}

/// Format records back into a `name=value; …` string, keeping only records
/// whose domain contains `domain_filter` as a substring.
///
/// Returns the empty string when nothing matches. For well-formed input this
/// is the left inverse of [`parse`]: the resulting string carries exactly the
/// same name/value pairs, restricted to the target domain.
pub fn format(records: &[CookieRecord], domain_filter: &str) -> String {
    records
        .iter()
        .filter(|record| record.domain.contains(domain_filter))
        .map(|record| format!("{}={}", record.name, record.value))
        .collect::<Vec<_>>()
        .join("; ")
}
