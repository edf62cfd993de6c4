//! Task identity derivation.
//!
//! Task names are the only deduplication key the managed task service
//! understands. An identity is stable for one `(module_path, version)` within
//! one change-interval bucket, and changes once the bucket rolls over.
//!
//! Layout: `<shard>-<escaped module@version>-<bucket>`, where `shard` is four
//! hex characters of SHA-256 over `module@version` (spreads names across the
//! service's index shards) and `bucket` is the truncated Unix time in seconds,
//! or in milliseconds when the interval is not a whole number of seconds.

use std::fmt::Write as _;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// Derive the task identity for a module version at `now`.
///
/// `now` is truncated to a multiple of `change_interval` counted from the
/// Unix epoch. A zero interval disables truncation.
pub fn derive_task_id(
    module_path: &str,
    version: &str,
    now: DateTime<Utc>,
    change_interval: Duration,
) -> String {
    let mv = format!("{module_path}@{version}");
    let digest = Sha256::digest(mv.as_bytes());
    let shard = hex::encode(&digest[..2]);

    let mut id = String::with_capacity(mv.len() * 2 + 24);
    id.push_str(&shard);
    id.push('-');
    escape_into(&mut id, &mv);
    let _ = write!(id, "-{}", bucket_label(now, change_interval));
    id
}

/// Escape a string so it contains only `[A-Za-z0-9_-]`.
///
/// Letters, digits and `-` pass through. `_` doubles, `/` `@` `.` map to
/// `_-` `_v` `_o`, and every other char becomes `_` plus its code point in
/// (at least four) lower-case hex digits.
pub fn escape_task_id_part(s: &str) -> String {
    let mut out = String::with_capacity(s.len() * 2);
    escape_into(&mut out, s);
    out
}

fn escape_into(out: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            'A'..='Z' | 'a'..='z' | '0'..='9' | '-' => out.push(c),
            '_' => out.push_str("__"),
            '/' => out.push_str("_-"),
            '@' => out.push_str("_v"),
            '.' => out.push_str("_o"),
            other => {
                let _ = write!(out, "_{:04x}", u32::from(other));
            }
        }
    }
}

/// Start of the bucket containing `now`.
///
/// Whole Unix seconds when `interval` is a whole number of seconds (or
/// zero), Unix milliseconds otherwise, so sub-second buckets stay distinct.
fn bucket_label(now: DateTime<Utc>, interval: Duration) -> i64 {
    let millis = now.timestamp_millis();
    let step = i64::try_from(interval.as_millis()).unwrap_or(i64::MAX);
    let truncated = if step == 0 {
        millis
    } else {
        millis - millis.rem_euclid(step)
    };
    if step % 1000 == 0 {
        truncated.div_euclid(1000)
    } else {
        truncated
    }
}

/// Whether `c` may appear in a task identity.
pub fn is_legal_task_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}
