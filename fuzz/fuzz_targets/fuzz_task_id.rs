//! Fuzz target for task identity derivation.
//!
//! Any module path, version and time must yield an id made only of
//! `[A-Za-z0-9_-]`, the same one every time.

#![no_main]

use std::time::Duration;

use arbitrary::Arbitrary;
use chrono::DateTime;
use libfuzzer_sys::fuzz_target;

use fetch_queue::queue::task_id::{derive_task_id, escape_task_id_part, is_legal_task_id_char};

#[derive(Debug, Arbitrary)]
struct Input<'a> {
    module_path: &'a str,
    version: &'a str,
    secs: i32,
    interval_secs: u16,
}

fuzz_target!(|input: Input<'_>| {
    let Some(now) = DateTime::from_timestamp(i64::from(input.secs), 0) else {
        return;
    };
    let interval = Duration::from_secs(u64::from(input.interval_secs));

    let id = derive_task_id(input.module_path, input.version, now, interval);
    assert!(id.chars().all(is_legal_task_id_char), "illegal char in {id:?}");

    // Same input, same id.
    assert_eq!(id, derive_task_id(input.module_path, input.version, now, interval));

    let escaped = escape_task_id_part(input.module_path);
    assert!(escaped.chars().all(is_legal_task_id_char));
    assert!(escaped.len() >= input.module_path.chars().count());
});
