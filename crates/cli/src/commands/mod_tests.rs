// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    plain = { "k=v", Some(("k", "v")) },
    empty_value = { "k=", Some(("k", "")) },
    value_with_equals = { "k=a=b", Some(("k", "a=b")) },
    no_separator = { "kv", None },
    empty_key = { "=v", None },
)]
fn key_value_parsing(input: &str, expected: Option<(&str, &str)>) {
    let parsed = parse_key_value(input).ok();
    assert_eq!(
        parsed,
        expected.map(|(k, v)| (k.to_string(), v.to_string()))
    );
}
