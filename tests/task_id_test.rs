//! Tests for task identity derivation through the public API.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;

use fetch_queue::queue::task_id::is_legal_task_id_char;
use fetch_queue::queue::{derive_task_id, escape_task_id_part};

const THREE_HOURS: Duration = Duration::from_secs(3 * 3600);

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

#[test]
fn test_window_scenario() {
    // 2024-01-01T00:00:00Z starts a three-hour bucket.
    let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let first = derive_task_id("mod", "v1.2.3", t, THREE_HOURS);
    let mid = derive_task_id("mod", "v1.2.3", t + chrono::Duration::minutes(90), THREE_HOURS);
    let next = derive_task_id("mod", "v1.2.3", t + chrono::Duration::hours(4), THREE_HOURS);

    assert_eq!(first, mid);
    assert_ne!(first, next);
}

#[test]
fn test_different_versions_differ() {
    let t = at(1_700_000_000);
    assert_ne!(
        derive_task_id("golang.org/x/net", "v0.1.0", t, THREE_HOURS),
        derive_task_id("golang.org/x/net", "v0.1.1", t, THREE_HOURS)
    );
}

#[test]
fn test_escaped_part_is_embedded() {
    let id = derive_task_id("golang.org/x/net", "v0.1.0", at(0), THREE_HOURS);
    let escaped = escape_task_id_part("golang.org/x/net@v0.1.0");
    assert_eq!(escaped, "golang_oorg_-x_-net_vv0_o1_o0");
    assert!(id.contains(&escaped), "{id}");
    assert!(id.ends_with("-0"), "{id}");
}

proptest! {
    #[test]
    fn ids_only_use_legal_chars(module in "\\PC{0,64}", version in "\\PC{0,16}", secs in 0i64..4_000_000_000) {
        let id = derive_task_id(&module, &version, at(secs), THREE_HOURS);
        prop_assert!(id.chars().all(is_legal_task_id_char), "illegal char in {:?}", id);
    }

    #[test]
    fn ids_are_stable_within_a_bucket(module in "[a-z./]{1,40}", bucket in 0i64..100_000, offset in 0i64..10_800) {
        let start = bucket * 10_800;
        prop_assert_eq!(
            derive_task_id(&module, "v1.0.0", at(start), THREE_HOURS),
            derive_task_id(&module, "v1.0.0", at(start + offset), THREE_HOURS)
        );
    }

    #[test]
    fn adjacent_buckets_differ(module in "[a-z./]{1,40}", bucket in 0i64..100_000, offset in 0i64..10_800) {
        let start = bucket * 10_800;
        prop_assert_ne!(
            derive_task_id(&module, "v1.0.0", at(start + offset), THREE_HOURS),
            derive_task_id(&module, "v1.0.0", at(start + 10_800 + offset), THREE_HOURS)
        );
    }

    #[test]
    fn zero_interval_keeps_every_second(secs in 0i64..4_000_000_000) {
        let id = derive_task_id("m", "v1", at(secs), Duration::ZERO);
        let expected_suffix = format!("-{secs}");
        prop_assert!(id.ends_with(&expected_suffix));
    }
}
