// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    simple = { "r1" },
    uuid_like = { "0190a2b4-7c3d-7e5f-8a9b-0c1d2e3f4a5b" },
    underscores = { "nightly_batch_01" },
    leading_dash = { "-lead" },
    max_len = { "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa" },
)]
fn accepts_valid_ids(id: &str) {
    assert_eq!(validate_run_id(id), Ok(()));
}

#[test]
fn rejects_empty() {
    assert_eq!(validate_run_id(""), Err(RunIdError::Empty));
}

#[test]
fn rejects_too_long() {
    let id = "a".repeat(MAX_RUN_ID_LEN + 1);
    assert_eq!(validate_run_id(&id), Err(RunIdError::TooLong(65)));
}

#[parameterized(
    space = { "a b", ' ' },
    slash = { "a/b", '/' },
    dot = { "a.b", '.' },
    colon = { "a:b", ':' },
    unicode = { "ünïd", 'ü' },
)]
fn rejects_invalid_chars(id: &str, bad: char) {
    assert_eq!(validate_run_id(id), Err(RunIdError::InvalidChar(bad)));
}

#[test]
fn uuid_gen_produces_valid_sortable_ids() {
    let gen = UuidIdGen;
    let a = gen.next();
    let b = gen.next();
    assert!(validate_run_id(&a).is_ok());
    assert!(validate_run_id(&b).is_ok());
    // v7 embeds a timestamp prefix, so later IDs sort after earlier ones
    assert!(a <= b);
}

#[test]
fn sequential_gen_counts_up() {
    let gen = SequentialIdGen::new("t");
    assert_eq!(gen.next(), "t-1");
    assert_eq!(gen.next(), "t-2");
    let clone = gen.clone();
    assert_eq!(clone.next(), "t-3");
}

#[test]
fn short_truncates() {
    let id = RunId::new("abcdef");
    assert_eq!(id.short(4), "abcd");
    assert_eq!(id.short(10), "abcdef");
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn valid_grammar_always_accepted(id in "[-A-Za-z0-9_]{1,64}") {
            prop_assert_eq!(validate_run_id(&id), Ok(()));
        }

        #[test]
        fn generated_uuids_always_accepted(_n in 0u8..16) {
            let id = UuidIdGen.next();
            prop_assert!(validate_run_id(&id).is_ok());
        }
    }
}
