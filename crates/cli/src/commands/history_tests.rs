// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[test]
fn parses_rfc3339_and_bare_dates() {
    let full = parse_timestamp("2026-03-14T12:30:00Z").unwrap();
    assert_eq!(full.to_rfc3339(), "2026-03-14T12:30:00+00:00");

    let bare = parse_timestamp("2026-03-14").unwrap();
    assert_eq!(bare.to_rfc3339(), "2026-03-14T00:00:00+00:00");

    assert!(parse_timestamp("14/03/2026").is_err());
}

#[parameterized(
    seconds = { "90s", 90 },
    minutes = { "30m", 30 * 60 },
    hours = { "1h", 3600 },
    days = { "2d", 2 * 86400 },
)]
fn parses_durations(input: &str, secs: i64) {
    assert_eq!(parse_duration(input).unwrap().num_seconds(), secs);
}

#[parameterized(
    missing_unit = { "90" },
    unknown_unit = { "90w" },
    not_a_number = { "abcs" },
    empty = { "" },
)]
fn rejects_bad_durations(input: &str) {
    assert!(parse_duration(input).is_err());
}
