use std::sync::Arc;

use chrono::Datelike;

use crate::db::budget_queries::BudgetStore;
use crate::services::clock::Clock;
use crate::settings::BudgetSettings;

/// Verdict from the pre-call budget gate.
#[derive(Debug, Clone, PartialEq)]
pub enum BudgetVerdict {
    Ok(String),
    /// Usable, but past 80% of the daily ceiling.
    Warn(String),
    Exhausted(String),
}

impl BudgetVerdict {
    pub fn allows_call(&self) -> bool {
        !matches!(self, BudgetVerdict::Exhausted(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BudgetSummary {
    pub calls_today: i64,
    pub cost_today: f64,
    pub month_cost: f64,
    pub daily_ceiling: i64,
    pub monthly_ceiling: f64,
}

/// Ledger gate for the paid sentiment vendor.
///
/// The check and the later record may race across workers; the daily
/// ceiling is a soft target, the monthly ceiling is the hard stop. When the
/// ledger store is unreachable the gate fails closed.
pub struct BudgetTracker {
    store: Arc<dyn BudgetStore>,
    clock: Arc<dyn Clock>,
    config: BudgetSettings,
}

impl BudgetTracker {
    pub fn new(store: Arc<dyn BudgetStore>, clock: Arc<dyn Clock>, config: BudgetSettings) -> Self {
        Self { store, clock, config }
    }

    pub async fn can_call(&self) -> BudgetVerdict {
        let today = self.clock.today_eastern();

        let (calls_today, _) = match self.store.day_usage(today).await {
            Ok(usage) => usage.unwrap_or((0, 0.0)),
            Err(e) => {
                tracing::error!(error = %e, "Budget ledger unreachable; failing closed");
                return BudgetVerdict::Exhausted("budget ledger unreachable".to_string());
            }
        };

        if calls_today >= self.config.daily_call_ceiling {
            return BudgetVerdict::Exhausted(format!(
                "Daily limit reached ({}/{} calls)",
                calls_today, self.config.daily_call_ceiling
            ));
        }

        let month_cost = match self.store.month_cost(today.year(), today.month()).await {
            Ok(cost) => cost,
            Err(e) => {
                tracing::error!(error = %e, "Budget ledger unreachable; failing closed");
                return BudgetVerdict::Exhausted("budget ledger unreachable".to_string());
            }
        };

        if month_cost >= self.config.monthly_cost_ceiling {
            return BudgetVerdict::Exhausted(format!(
                "Monthly budget exceeded (${:.2}/${:.2})",
                month_cost, self.config.monthly_cost_ceiling
            ));
        }

        let status = format!(
            "{}/{} calls today, ${:.2} this month",
            calls_today, self.config.daily_call_ceiling, month_cost
        );

        if (calls_today as f64) >= self.config.daily_call_ceiling as f64 * 0.8 {
            BudgetVerdict::Warn(status)
        } else {
            BudgetVerdict::Ok(status)
        }
    }

    /// Record one paid call: calls+1 and cost in a single transaction on
    /// today's row.
    pub async fn record_call(&self, cost: f64) -> Result<(), sqlx::Error> {
        let today = self.clock.today_eastern();
        self.store.record(today, cost, self.clock.now_utc()).await
    }

    pub async fn status_summary(&self) -> Result<BudgetSummary, sqlx::Error> {
        let today = self.clock.today_eastern();
        let (calls_today, cost_today) = self.store.day_usage(today).await?.unwrap_or((0, 0.0));
        let month_cost = self.store.month_cost(today.year(), today.month()).await?;

        Ok(BudgetSummary {
            calls_today,
            cost_today,
            month_cost,
            daily_ceiling: self.config.daily_call_ceiling,
            monthly_ceiling: self.config.monthly_cost_ceiling,
        })
    }
}

#[cfg(test)]
pub mod test_support {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use chrono::{DateTime, Datelike, NaiveDate, Utc};
    use parking_lot::Mutex;

    use crate::db::budget_queries::BudgetStore;

    /// In-memory ledger with the same row semantics as the durable one.
    #[derive(Default)]
    pub struct InMemoryBudgetStore {
        pub rows: Mutex<HashMap<NaiveDate, (i64, f64)>>,
    }

    #[async_trait]
    impl BudgetStore for InMemoryBudgetStore {
        async fn day_usage(&self, day: NaiveDate) -> Result<Option<(i64, f64)>, sqlx::Error> {
            Ok(self.rows.lock().get(&day).copied())
        }

        async fn month_cost(&self, year: i32, month: u32) -> Result<f64, sqlx::Error> {
            Ok(self
                .rows
                .lock()
                .iter()
                .filter(|(date, _)| date.year() == year && date.month() == month)
                .map(|(_, (_, cost))| cost)
                .sum())
        }

        async fn record(
            &self,
            day: NaiveDate,
            cost: f64,
            _now: DateTime<Utc>,
        ) -> Result<(), sqlx::Error> {
            let mut rows = self.rows.lock();
            let entry = rows.entry(day).or_insert((0, 0.0));
            entry.0 += 1;
            entry.1 += cost;
            Ok(())
        }
    }

    /// Ledger that always errors, for the fail-closed property.
    pub struct BrokenBudgetStore;

    #[async_trait]
    impl BudgetStore for BrokenBudgetStore {
        async fn day_usage(&self, _day: NaiveDate) -> Result<Option<(i64, f64)>, sqlx::Error> {
            Err(sqlx::Error::PoolClosed)
        }

        async fn month_cost(&self, _year: i32, _month: u32) -> Result<f64, sqlx::Error> {
            Err(sqlx::Error::PoolClosed)
        }

        async fn record(
            &self,
            _day: NaiveDate,
            _cost: f64,
            _now: DateTime<Utc>,
        ) -> Result<(), sqlx::Error> {
            Err(sqlx::Error::PoolClosed)
        }
    }
}
