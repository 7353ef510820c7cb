// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::TimeZone;

#[test]
fn ref_display_and_parse_round_trip() {
    let r = DagRunRef::new("etl", "r1");
    let s = r.to_string();
    assert_eq!(s, "etl:r1");
    assert_eq!(s.parse::<DagRunRef>().unwrap(), r);
}

#[test]
fn ref_parse_errors() {
    assert_eq!(
        "noseparator".parse::<DagRunRef>(),
        Err(RefParseError::MissingSeparator("noseparator".into()))
    );
    assert_eq!(
        ":r1".parse::<DagRunRef>(),
        Err(RefParseError::EmptyName(":r1".into()))
    );
    assert_eq!(
        "etl:".parse::<DagRunRef>(),
        Err(RefParseError::EmptyRunId("etl:".into()))
    );
}

#[test]
fn run_dir_name_embeds_utc_timestamp() {
    let ts = chrono::Utc.with_ymd_and_hms(2026, 3, 14, 15, 30, 45).unwrap();
    let name = run_dir_name(ts, &RunId::new("r1"));
    assert_eq!(name, "20260314_153045Z_r1");
}

#[test]
fn run_dir_names_sort_chronologically() {
    let early = chrono::Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();
    let late = chrono::Utc.with_ymd_and_hms(2026, 1, 10, 0, 0, 0).unwrap();
    let a = run_dir_name(early, &RunId::new("zzz"));
    let b = run_dir_name(late, &RunId::new("aaa"));
    assert!(a < b);
}

#[test]
fn parse_round_trip() {
    let ts = chrono::Utc.with_ymd_and_hms(2026, 3, 14, 15, 30, 45).unwrap();
    let name = run_dir_name(ts, &RunId::new("run_with_underscores"));
    let (parsed_ts, parsed_id) = parse_run_dir_name(&name).unwrap();
    assert_eq!(parsed_ts, ts);
    assert_eq!(parsed_id, RunId::new("run_with_underscores"));
}

#[test]
fn parse_rejects_foreign_names() {
    assert!(parse_run_dir_name(".hidden").is_none());
    assert!(parse_run_dir_name("20260314").is_none());
    assert!(parse_run_dir_name("20260314_153045_r1").is_none()); // missing Z
    assert!(parse_run_dir_name("notadate_153045Z_r1").is_none());
}
