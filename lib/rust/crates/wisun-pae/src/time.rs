// Copyright 2018 The Fuchsia Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use {
    crate::Error,
    log::{error, info},
    std::{
        fmt,
        time::{SystemTime, UNIX_EPOCH},
    },
};

pub const SECONDS_IN_WEEK: u64 = 7 * 24 * 60 * 60;
/// How far persisted time may lie ahead of the clock before the clock is considered wrong.
pub const SYSTEM_TIME_MAXIMUM_DIFF: u64 = 12 * 30 * 24 * 60 * 60;

/// Wall clock in seconds.
pub trait Clock: fmt::Debug {
    fn now(&self) -> u64;
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
    }
}

/// Fails when `stored` lies implausibly far in the future of `current`.
pub fn check_stored_time(stored: u64, current: u64) -> Result<(), Error> {
    if stored > current && stored - current > SYSTEM_TIME_MAXIMUM_DIFF {
        return Err(Error::Time { stored, current });
    }
    Ok(())
}

/// Picks the time persisted lifetimes and counters are measured against.
pub fn select_reference_time(stored: u64, current: u64) -> u64 {
    if current > stored && current - stored > SECONDS_IN_WEEK {
        info!("stored time {} is stale, using current time {}", stored, current);
        return current;
    }
    if let Err(e) = check_stored_time(stored, current) {
        error!("{}", e);
        return stored;
    }
    current
}

#[cfg(test)]
mod tests {
    use {super::*, test_case::test_case};

    const NOW: u64 = 1_700_000_000;

    #[test_case(NOW - 60, NOW ; "recent past uses clock")]
    #[test_case(NOW - SECONDS_IN_WEEK - 1, NOW ; "stale stored time uses clock")]
    #[test_case(NOW + 3600, NOW ; "slightly ahead uses clock")]
    #[test_case(NOW + SYSTEM_TIME_MAXIMUM_DIFF + 1, NOW + SYSTEM_TIME_MAXIMUM_DIFF + 1 ; "far future trusts stored")]
    fn reference_time(stored: u64, expected: u64) {
        assert_eq!(select_reference_time(stored, NOW), expected);
    }

    #[test]
    fn far_future_is_a_time_error() {
        let stored = NOW + SYSTEM_TIME_MAXIMUM_DIFF + 10;
        assert!(matches!(
            check_stored_time(stored, NOW),
            Err(Error::Time { stored: s, current: NOW }) if s == stored
        ));
        assert!(check_stored_time(NOW - 1, NOW).is_ok());
    }

    #[test]
    fn system_clock_is_after_epoch() {
        assert!(SystemClock.now() > 0);
    }
}
