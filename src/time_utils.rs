// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time formatting and bounded I/O.

use crate::error::AppError;
use chrono::{DateTime, FixedOffset, Offset, Utc};
use std::future::Future;
use std::time::Duration;

/// Portal users live in Moscow time (UTC+3, no DST).
const MOSCOW_OFFSET_SECS: i32 = 3 * 60 * 60;

fn moscow() -> FixedOffset {
    FixedOffset::east_opt(MOSCOW_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

/// Format a ride start as `dd.mm.yy HH:MM` in Moscow time.
pub fn format_ride_start(date: DateTime<Utc>) -> String {
    date.with_timezone(&moscow()).format("%d.%m.%y %H:%M").to_string()
}

/// Format a ride end as `HH:MM` in Moscow time.
pub fn format_ride_end(date: DateTime<Utc>) -> String {
    date.with_timezone(&moscow()).format("%H:%M").to_string()
}

/// Run an I/O future with an upper bound on its duration.
///
/// Elapsing maps to [`AppError::Timeout`] so callers handle it like any other
/// I/O failure.
pub async fn bounded<T, F>(limit: Duration, what: &str, fut: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation = what, limit_ms = limit.as_millis() as u64, "I/O call timed out");
            Err(AppError::Timeout(format!("{} exceeded {:?}", what, limit)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_ride_times_are_moscow() {
        let start = Utc.with_ymd_and_hms(2024, 3, 5, 7, 30, 0).unwrap();
        assert_eq!(format_ride_start(start), "05.03.24 10:30");
        assert_eq!(format_ride_end(start), "10:30");
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let result: Result<(), AppError> = bounded(Duration::from_millis(10), "sleep", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(AppError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_bounded_passes_through() {
        let result = bounded(Duration::from_secs(1), "ready", async { Ok(7) }).await;
        assert_eq!(result.unwrap(), 7);
    }
}
