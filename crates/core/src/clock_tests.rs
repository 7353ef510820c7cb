// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn system_clock_moves_forward() {
    let clock = SystemClock;
    let a = clock.epoch_ms();
    let b = clock.epoch_ms();
    assert!(b >= a);
}

#[test]
fn fake_clock_advances() {
    let clock = FakeClock::at_epoch_ms(1_000);
    assert_eq!(clock.epoch_ms(), 1_000);
    clock.advance_ms(250);
    assert_eq!(clock.epoch_ms(), 1_250);
}

#[test]
fn fake_clock_clones_share_time() {
    let clock = FakeClock::at_epoch_ms(0);
    let other = clock.clone();
    clock.advance_ms(100);
    assert_eq!(other.epoch_ms(), 100);
}

#[test]
fn fake_clock_utc_tracks_epoch() {
    let clock = FakeClock::at_epoch_ms(0);
    assert_eq!(clock.utc_now().timestamp_millis(), 0);
    clock.advance_ms(5_000);
    assert_eq!(clock.utc_now().timestamp_millis(), 5_000);
}
