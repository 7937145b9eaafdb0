use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use gpool_common::Money;
use gpool_storage::{entities::request_log, CredentialStore, LogStore, RollupAggregate, RollupKey, RollupStore};
use time::{Date, OffsetDateTime, Time};
use tokio::sync::Notify;

pub const DEFAULT_TICK: Duration = Duration::from_secs(300);

/// Periodic rollup task (spec.md §4.6), grounded on the original service's
/// `StatsTask._run_loop`/`_execute_stats`. One long-lived cooperative task;
/// `trigger_now` lets an operator force an out-of-band tick.
pub struct RollupWorker<C, L, R> {
    credentials: Arc<C>,
    logs: Arc<L>,
    rollups: Arc<R>,
    tick: Duration,
    trigger: Arc<Notify>,
    last_hour_seen: std::sync::Mutex<Option<u8>>,
}

impl<C, L, R> RollupWorker<C, L, R>
where
    C: CredentialStore + 'static,
    L: LogStore + 'static,
    R: RollupStore + 'static,
{
    pub fn new(credentials: Arc<C>, logs: Arc<L>, rollups: Arc<R>, tick: Duration) -> Self {
        Self { credentials, logs, rollups, tick, trigger: Arc::new(Notify::new()), last_hour_seen: std::sync::Mutex::new(None) }
    }

    pub fn trigger_handle(&self) -> Arc<Notify> {
        self.trigger.clone()
    }

    /// Runs forever. A tick failure is logged and the task sleeps 60s
    /// before continuing rather than aborting (spec.md §4.6 failure policy).
    pub async fn run(self: Arc<Self>) {
        loop {
            let sleep = tokio::time::sleep(self.tick);
            tokio::select! {
                _ = sleep => {}
                _ = self.trigger.notified() => {}
            }

            if let Err(error) = self.tick_once().await {
                tracing::error!(%error, event = "rollup_tick_failed");
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
        }
    }

    pub async fn trigger_now(&self) {
        self.trigger.notify_one();
    }

    async fn tick_once(&self) -> anyhow::Result<()> {
        let now = OffsetDateTime::now_utc();
        let today = now.date();
        let current_hour = now.hour();

        tracing::info!(%now, event = "rollup_tick_start");

        self.recompute_window(today, None).await?;
        self.recompute_window(today, Some(current_hour)).await?;

        let mut last_seen = self.last_hour_seen.lock().expect("lock never poisoned");
        if last_seen.replace(current_hour) != Some(current_hour) {
            drop(last_seen);
            if let Some((previous_date, previous_hour)) = previous_hour_window(today, current_hour) {
                tracing::info!(%previous_date, previous_hour, event = "rollup_previous_hour_close");
                self.recompute_window(previous_date, Some(previous_hour)).await?;
            }
        }

        self.refresh_balances().await?;
        tracing::info!(event = "rollup_tick_done");
        Ok(())
    }

    /// Scans `request_log` for one `(date, hour?)` window and upserts the
    /// global/provider/model aggregations (spec.md §4.6 step 1).
    async fn recompute_window(&self, stat_date: Date, stat_hour: Option<u8>) -> anyhow::Result<()> {
        let (start, end) = window_bounds(stat_date, stat_hour);
        let rows = self.logs.rows_in_window(start, end).await?;

        let global = aggregate(rows.iter());
        self.rollups
            .upsert(
                RollupKey { stat_date, stat_hour: stat_hour.map(i16::from), stat_type: "global".to_string(), provider: None, model: None, key_id: None },
                global,
            )
            .await?;

        let mut by_provider: BTreeMap<String, Vec<&request_log::Model>> = BTreeMap::new();
        let mut by_model: BTreeMap<(String, String), Vec<&request_log::Model>> = BTreeMap::new();
        for row in &rows {
            by_provider.entry(row.provider.clone()).or_default().push(row);
            let model = row.response_model.clone().unwrap_or_else(|| row.requested_model.clone());
            by_model.entry((model, row.provider.clone())).or_default().push(row);
        }

        for (provider, rows) in by_provider {
            let aggregate = aggregate(rows.into_iter());
            self.rollups
                .upsert(
                    RollupKey { stat_date, stat_hour: stat_hour.map(i16::from), stat_type: "provider".to_string(), provider: Some(provider), model: None, key_id: None },
                    aggregate,
                )
                .await?;
        }

        for ((model, provider), rows) in by_model {
            let aggregate = aggregate(rows.into_iter());
            self.rollups
                .upsert(
                    RollupKey { stat_date, stat_hour: stat_hour.map(i16::from), stat_type: "model".to_string(), provider: Some(provider), model: Some(model), key_id: None },
                    aggregate,
                )
                .await?;
        }

        Ok(())
    }

    /// Per-key balance refresh (spec.md §4.6 step 4). Keys without
    /// `total_authorized` are skipped with a warning rather than an error.
    async fn refresh_balances(&self) -> anyhow::Result<()> {
        let keys = self.credentials.list_enabled_with_total_authorized().await?;
        let now = OffsetDateTime::now_utc();
        for key in keys {
            let Some(total_authorized) = key.total_authorized else {
                tracing::warn!(key_id = key.id, event = "rollup_balance_skip_no_total_authorized");
                continue;
            };
            let spent = self.logs.sum_cost(key.id).await?;
            let balance = total_authorized.checked_sub(spent).unwrap_or(Money::ZERO);
            self.credentials.set_balance(key.id, balance, now).await?;
        }
        Ok(())
    }
}

/// The just-finished hour bucket to re-close this tick. At the midnight
/// tick (`current_hour == 0`) that bucket is 23:00 on the *previous* day,
/// not hour -1 of today (spec.md §4.6 step 3) — otherwise the day's last
/// hour is never reconciled. `None` only on the practically-unreachable
/// `Date` underflow at the minimum representable date.
fn previous_hour_window(today: Date, current_hour: u8) -> Option<(Date, u8)> {
    if current_hour == 0 {
        today.previous_day().map(|d| (d, 23))
    } else {
        Some((today, current_hour - 1))
    }
}

fn window_bounds(stat_date: Date, stat_hour: Option<u8>) -> (OffsetDateTime, OffsetDateTime) {
    let start_time = stat_hour.map(|h| Time::from_hms(h, 0, 0).expect("hour in 0..24")).unwrap_or(Time::MIDNIGHT);
    let start = stat_date.with_time(start_time).assume_utc();
    let end = match stat_hour {
        Some(h) if h < 23 => stat_date.with_time(Time::from_hms(h + 1, 0, 0).expect("hour+1 in 1..24")).assume_utc(),
        Some(_) => start + time::Duration::hours(1),
        None => start + time::Duration::days(1),
    };
    (start, end)
}

fn aggregate<'a>(rows: impl Iterator<Item = &'a request_log::Model>) -> RollupAggregate {
    let mut agg = RollupAggregate::default();
    let mut latencies: Vec<i64> = Vec::new();
    for row in rows {
        agg.request_count += 1;
        if row.status == "success" {
            agg.success_count += 1;
        } else if row.status == "error" {
            agg.error_count += 1;
        }
        agg.prompt_tokens += row.prompt_tokens;
        agg.completion_tokens += row.completion_tokens;
        agg.total_tokens_openai += row.total_tokens;
        agg.input_tokens += row.input_tokens;
        agg.output_tokens += row.output_tokens;
        agg.cache_creation_input_tokens += row.cache_creation_input_tokens;
        agg.cache_read_input_tokens += row.cache_read_input_tokens;
        agg.total_cost = agg.total_cost + Money::parse_or_zero(&row.cost);
        latencies.push(row.latency_ms);
    }
    if !latencies.is_empty() {
        agg.avg_latency_ms = latencies.iter().sum::<i64>() / latencies.len() as i64;
        agg.max_latency_ms = *latencies.iter().max().expect("checked non-empty");
        agg.min_latency_ms = *latencies.iter().min().expect("checked non-empty");
    }
    agg
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_bounds_for_whole_day() {
        let date = Date::from_calendar_date(2026, time::Month::July, 28).unwrap();
        let (start, end) = window_bounds(date, None);
        assert_eq!(start.hour(), 0);
        assert_eq!((end - start), time::Duration::days(1));
    }

    #[test]
    fn window_bounds_for_one_hour() {
        let date = Date::from_calendar_date(2026, time::Month::July, 28).unwrap();
        let (start, end) = window_bounds(date, Some(23));
        assert_eq!(start.hour(), 23);
        assert_eq!((end - start), time::Duration::hours(1));
    }

    #[test]
    fn previous_hour_window_stays_within_the_day_for_ordinary_hours() {
        let date = Date::from_calendar_date(2026, time::Month::July, 28).unwrap();
        assert_eq!(previous_hour_window(date, 14), Some((date, 13)));
    }

    #[test]
    fn previous_hour_window_crosses_midnight_into_the_previous_day() {
        let date = Date::from_calendar_date(2026, time::Month::July, 28).unwrap();
        let yesterday = Date::from_calendar_date(2026, time::Month::July, 27).unwrap();
        assert_eq!(previous_hour_window(date, 0), Some((yesterday, 23)));
    }
}
