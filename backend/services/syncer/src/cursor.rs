use chrono::{DateTime, Utc};

/// "Last successful sync" watermark. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncCursor {
    last_synced_at: DateTime<Utc>,
}

impl SyncCursor {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            last_synced_at: start,
        }
    }

    pub fn get(&self) -> DateTime<Utc> {
        self.last_synced_at
    }

    /// Move the watermark to `now`, ignoring values behind the current one.
    pub fn advance(&mut self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.last_synced_at = self.last_synced_at.max(now);
        self.last_synced_at
    }
}

impl Default for SyncCursor {
    fn default() -> Self {
        Self::new(DateTime::<Utc>::UNIX_EPOCH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn default_starts_at_epoch() {
        assert_eq!(SyncCursor::default().get(), DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn advance_moves_forward() {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let mut cursor = SyncCursor::new(t0);
        let t1 = t0 + Duration::minutes(5);
        assert_eq!(cursor.advance(t1), t1);
        assert_eq!(cursor.get(), t1);
    }

    #[test]
    fn advance_never_moves_backwards() {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let mut cursor = SyncCursor::new(t0);
        cursor.advance(t0 - Duration::hours(1));
        assert_eq!(cursor.get(), t0);
    }
}
