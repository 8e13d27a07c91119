//! Once-a-day sync schedule.
//!
//! The run is due once the local clock passes the scheduled time on a day
//! that has not had a run yet. A terminal started after the scheduled time
//! catches up on its first tick.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailySchedule {
    at: NaiveTime,
}

impl DailySchedule {
    pub fn new(at: NaiveTime) -> Self {
        DailySchedule { at }
    }

    pub fn at(&self) -> NaiveTime {
        self.at
    }

    /// True when `now` is at or past the scheduled time and no scheduled
    /// run happened on `now`'s date.
    pub fn is_due(&self, now: NaiveDateTime, last_run: Option<NaiveDate>) -> bool {
        now.time() >= self.at && last_run != Some(now.date())
    }

    /// The day a previous sync counts for, if it satisfied that day's slot.
    ///
    /// A sync at 09:00 does not satisfy a 12:00 schedule for the same day.
    pub fn satisfied_day(&self, last_sync: Option<DateTime<Local>>) -> Option<NaiveDate> {
        let local = last_sync?.naive_local();
        (local.time() >= self.at).then(|| local.date())
    }

    /// When the next scheduled run happens.
    pub fn next_run(&self, now: NaiveDateTime, last_run: Option<NaiveDate>) -> NaiveDateTime {
        let today = now.date();
        if last_run == Some(today) || now.time() < self.at {
            let day = if last_run == Some(today) {
                today.succ_opt().unwrap_or(today)
            } else {
                today
            };
            day.and_time(self.at)
        } else {
            now
        }
    }
}
