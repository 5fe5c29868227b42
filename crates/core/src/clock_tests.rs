// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn system_clock_is_after_2020() {
    // 2020-01-01T00:00:00Z
    assert!(SystemClock.now_ms() > 1_577_836_800_000);
}

#[test]
fn manual_clock_only_moves_when_told() {
    let clock = ManualClock::new(1_000);
    assert_eq!(clock.now_ms(), 1_000);
    assert_eq!(clock.now_ms(), 1_000);

    clock.advance(Duration::from_millis(250));
    assert_eq!(clock.now_ms(), 1_250);

    clock.set(50);
    assert_eq!(clock.now_ms(), 50);
}

#[test]
fn clock_source_by_reference() {
    fn read<C: ClockSource>(clock: C) -> u64 {
        clock.now_ms()
    }

    let clock = ManualClock::new(42);
    assert_eq!(read(&clock), 42);
}
