//! Scheduled settlement trigger.
//!
//! Fires `announce_result` with a uniformly random winning number at the
//! configured daily hours. This is orchestration only — it is simply an
//! alternate caller of the settlement engine, with the same contract as
//! a manual admin announcement. An hour slot fires at most once per day.

use chrono::{NaiveDate, Timelike, Utc};
use rand::Rng;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::config::GameConfig;
use crate::types::LedgerError;

use super::settlement::SettlementEngine;

/// How often the scheduler checks the clock.
const TICK_INTERVAL: Duration = Duration::from_secs(30);

/// One announcement slot: a calendar day and an hour of that day.
type Slot = (NaiveDate, u32);

pub struct ResultScheduler {
    settlement: SettlementEngine,
    game: GameConfig,
}

impl ResultScheduler {
    pub fn new(settlement: SettlementEngine, game: GameConfig) -> Self {
        Self { settlement, game }
    }

    /// Run the scheduler as a background task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        info!(hours = ?self.game.result_hours, "Result scheduler running");
        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        let mut last_fired: Option<Slot> = None;

        loop {
            ticker.tick().await;
            let now = Utc::now();
            let Some(slot) = due_slot(
                now.date_naive(),
                now.hour(),
                &self.game.result_hours,
                last_fired,
            ) else {
                continue;
            };
            last_fired = Some(slot);

            let winning_number = rand::thread_rng()
                .gen_range(self.game.number_min..=self.game.number_max);

            match self.settlement.announce_result(winning_number).await {
                Ok(report) => {
                    info!(
                        round_id = %report.round_id,
                        winning_number,
                        bets = report.bets_settled,
                        profit = %report.profit,
                        "Scheduled result announced"
                    );
                }
                Err(LedgerError::NoOpenRound) => {
                    debug!(hour = slot.1, "Scheduled result time with no open round");
                }
                Err(e) => {
                    error!(error = %e, "Scheduled settlement failed");
                }
            }
        }
    }
}

/// Which slot, if any, should fire now. A slot fires once: when the
/// current hour is a configured result hour and differs from the last
/// fired slot.
fn due_slot(
    today: NaiveDate,
    hour: u32,
    result_hours: &[u32],
    last_fired: Option<Slot>,
) -> Option<Slot> {
    if !result_hours.contains(&hour) {
        return None;
    }
    let slot = (today, hour);
    if last_fired == Some(slot) {
        return None;
    }
    Some(slot)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[test]
    fn test_fires_on_configured_hour() {
        let slot = due_slot(day(1), 11, &[11, 15, 21], None);
        assert_eq!(slot, Some((day(1), 11)));
    }

    #[test]
    fn test_silent_outside_configured_hours() {
        assert_eq!(due_slot(day(1), 12, &[11, 15, 21], None), None);
        assert_eq!(due_slot(day(1), 0, &[11, 15, 21], None), None);
    }

    #[test]
    fn test_slot_fires_at_most_once() {
        let first = due_slot(day(1), 15, &[11, 15, 21], None).unwrap();
        assert_eq!(due_slot(day(1), 15, &[11, 15, 21], Some(first)), None);
    }

    #[test]
    fn test_next_hour_fires_again() {
        let first = due_slot(day(1), 15, &[11, 15, 21], None).unwrap();
        assert_eq!(
            due_slot(day(1), 21, &[11, 15, 21], Some(first)),
            Some((day(1), 21)),
        );
    }

    #[test]
    fn test_same_hour_next_day_fires_again() {
        let first = due_slot(day(1), 11, &[11, 15, 21], None).unwrap();
        assert_eq!(
            due_slot(day(2), 11, &[11, 15, 21], Some(first)),
            Some((day(2), 11)),
        );
    }
}
