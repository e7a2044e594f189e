//! Windows FILETIME timestamps stored in chain records

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// 100-nanosecond intervals between 1601-01-01 and 1970-01-01
const UNIX_EPOCH_TICKS: i64 = 116_444_736_000_000_000;

/// Ticks per second (one tick is 100 ns)
const TICKS_PER_SECOND: i64 = 10_000_000;

/// A 64-bit Windows file time
///
/// The raw tick count is kept verbatim so records read from an archive are
/// written back bit-for-bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FileTime(i64);

impl FileTime {
    /// Wrap a raw tick count
    pub const fn from_ticks(ticks: i64) -> Self {
        Self(ticks)
    }

    /// Raw tick count as stored on disk
    pub const fn ticks(self) -> i64 {
        self.0
    }

    /// The current wall-clock time
    pub fn now() -> Self {
        Self::from(SystemTime::now())
    }

    /// Convert to a `SystemTime`, `None` if it predates what the platform can represent
    pub fn to_system_time(self) -> Option<SystemTime> {
        let since_unix = self.0 - UNIX_EPOCH_TICKS;
        let secs = since_unix.div_euclid(TICKS_PER_SECOND);
        let nanos = (since_unix.rem_euclid(TICKS_PER_SECOND) * 100) as u32;

        if secs >= 0 {
            UNIX_EPOCH.checked_add(Duration::new(secs as u64, nanos))
        } else {
            UNIX_EPOCH
                .checked_sub(Duration::from_secs(secs.unsigned_abs()))?
                .checked_add(Duration::from_nanos(u64::from(nanos)))
        }
    }
}

impl From<SystemTime> for FileTime {
    fn from(time: SystemTime) -> Self {
        let ticks = match time.duration_since(UNIX_EPOCH) {
            Ok(after) => {
                let ticks = after.as_secs() as i64 * TICKS_PER_SECOND
                    + i64::from(after.subsec_nanos() / 100);
                UNIX_EPOCH_TICKS.saturating_add(ticks)
            }
            Err(before) => {
                let before = before.duration();
                let ticks = before.as_secs() as i64 * TICKS_PER_SECOND
                    + i64::from(before.subsec_nanos() / 100);
                UNIX_EPOCH_TICKS.saturating_sub(ticks)
            }
        };
        Self(ticks)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_unix_epoch() {
        let ft = FileTime::from(UNIX_EPOCH);
        assert_eq!(ft.ticks(), UNIX_EPOCH_TICKS);
        assert_eq!(ft.to_system_time(), Some(UNIX_EPOCH));
    }

    #[test]
    fn test_round_trip_through_system_time() {
        let time = UNIX_EPOCH + Duration::new(1_400_000_000, 123_456_700);
        let ft = FileTime::from(time);
        assert_eq!(ft.to_system_time(), Some(time));
    }

    #[test]
    fn test_before_unix_epoch() {
        // 1601-01-01 itself
        let ft = FileTime::from_ticks(0);
        let time = ft.to_system_time().expect("representable");
        assert_eq!(FileTime::from(time), ft);
    }

    #[test]
    fn test_now_is_after_2020() {
        // 2020-01-01T00:00:00Z
        assert!(FileTime::now().ticks() > 132_223_104_000_000_000);
    }
}
