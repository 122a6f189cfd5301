use std::collections::HashSet;

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc, Weekday};
use chrono_tz::US::Eastern;
use parking_lot::Mutex;

/// Authoritative time source. Every time-of-day decision in the service
/// goes through one of these so the scheduler, budget rollover and filters
/// cannot drift apart.
pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;

    fn now_eastern(&self) -> DateTime<chrono_tz::Tz> {
        self.now_utc().with_timezone(&Eastern)
    }

    /// Calendar date in US-Eastern.
    fn today_eastern(&self) -> NaiveDate {
        self.now_eastern().date_naive()
    }
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Fixed clock for tests and replay.
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, duration: chrono::Duration) {
        let mut now = self.now.lock();
        *now += duration;
    }
}

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// US market holiday table, keyed by year. Hand-maintained; a lookup for an
/// unknown year yields an empty set and a one-time warning, never an error.
pub struct MarketCalendar {
    holidays: HashSet<NaiveDate>,
    known_years: HashSet<i32>,
    warned_years: Mutex<HashSet<i32>>,
}

fn d(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid holiday date")
}

impl Default for MarketCalendar {
    fn default() -> Self {
        Self::with_standard_holidays()
    }
}

impl MarketCalendar {
    pub fn with_standard_holidays() -> Self {
        let holidays: HashSet<NaiveDate> = [
            // 2025
            d(2025, 1, 1),
            d(2025, 1, 20),
            d(2025, 2, 17),
            d(2025, 4, 18),
            d(2025, 5, 26),
            d(2025, 6, 19),
            d(2025, 7, 4),
            d(2025, 9, 1),
            d(2025, 11, 27),
            d(2025, 12, 25),
            // 2026
            d(2026, 1, 1),
            d(2026, 1, 19),
            d(2026, 2, 16),
            d(2026, 4, 3),
            d(2026, 5, 25),
            d(2026, 6, 19),
            d(2026, 7, 3),
            d(2026, 9, 7),
            d(2026, 11, 26),
            d(2026, 12, 25),
        ]
        .into_iter()
        .collect();

        let known_years = holidays.iter().map(|h| h.year()).collect();

        Self {
            holidays,
            known_years,
            warned_years: Mutex::new(HashSet::new()),
        }
    }

    /// Saturday, Sunday, or a listed US market holiday. Unknown years are
    /// treated as fully open with a warning; the alternative of failing the
    /// job would silence the whole pipeline on January 1st.
    pub fn is_non_trading_day(&self, day: NaiveDate) -> bool {
        if matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            return true;
        }

        if !self.known_years.contains(&day.year()) {
            let mut warned = self.warned_years.lock();
            if warned.insert(day.year()) {
                tracing::warn!(
                    year = day.year(),
                    "No holiday table for year; treating all weekdays as trading days"
                );
            }
            return false;
        }

        self.holidays.contains(&day)
    }

    /// Most recent trading day strictly before `day`.
    pub fn previous_trading_day(&self, day: NaiveDate) -> NaiveDate {
        let mut candidate = day - chrono::Duration::days(1);
        while self.is_non_trading_day(candidate) {
            candidate -= chrono::Duration::days(1);
        }
        candidate
    }
}

/// Convert an Eastern-local naive timestamp to UTC, resolving DST folds to
/// the earlier instant.
pub fn eastern_to_utc(naive: chrono::NaiveDateTime) -> Option<DateTime<Utc>> {
    Eastern
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}
