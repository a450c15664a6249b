use crate::domain::error::ScheduleError;
use crate::domain::models::{DayName, DaySchedule, ScheduleEntry, SlotId, WeekSchedule};
use chrono::{DateTime, Datelike, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

pub type NowProvider = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Ordered class-bearing days. Every other weekday is a non-class day.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassCalendar {
    pub class_days: Vec<DayName>,
}

impl Default for ClassCalendar {
    fn default() -> Self {
        Self {
            class_days: vec![
                DayName::Sunday,
                DayName::Monday,
                DayName::Tuesday,
                DayName::Wednesday,
                DayName::Thursday,
            ],
        }
    }
}

impl ClassCalendar {
    pub fn validate(&self) -> Result<(), ScheduleError> {
        if self.class_days.is_empty() {
            return Err(ScheduleError::Validation(
                "calendar.class_days must not be empty".to_string(),
            ));
        }
        for (index, day) in self.class_days.iter().enumerate() {
            if self.class_days[..index].contains(day) {
                return Err(ScheduleError::Validation(format!(
                    "calendar.class_days lists {day} twice"
                )));
            }
        }
        Ok(())
    }

    pub fn is_class_day(&self, day: DayName) -> bool {
        self.class_days.contains(&day)
    }

    pub fn non_class_days(&self) -> Vec<DayName> {
        DayName::ALL
            .into_iter()
            .filter(|day| !self.is_class_day(*day))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NextClass {
    pub day: DayName,
    pub slot: SlotId,
    pub entry: ScheduleEntry,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct HighlightState {
    pub day: Option<DayName>,
    pub active_slot: Option<SlotId>,
    pub active_entry: Option<ScheduleEntry>,
    pub ended_slots: Vec<SlotId>,
    pub next: Option<NextClass>,
}

pub struct TimeWindowEvaluator {
    calendar: ClassCalendar,
    timezone: Tz,
    now_provider: NowProvider,
}

impl TimeWindowEvaluator {
    pub fn new(calendar: ClassCalendar, timezone: Tz) -> Self {
        Self {
            calendar,
            timezone,
            now_provider: Arc::new(Utc::now),
        }
    }

    pub fn with_now_provider(mut self, now_provider: NowProvider) -> Self {
        self.now_provider = now_provider;
        self
    }

    pub fn calendar(&self) -> &ClassCalendar {
        &self.calendar
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.now_provider)()
    }

    pub fn current_day_name(&self, now: DateTime<Utc>) -> Option<DayName> {
        let day = DayName::from_weekday(now.with_timezone(&self.timezone).weekday());
        self.calendar.is_class_day(day).then_some(day)
    }

    pub fn active_slot(
        &self,
        now: DateTime<Utc>,
        schedule: &DaySchedule,
    ) -> Result<Option<SlotId>, ScheduleError> {
        let minute = self.minute_of_day(now);
        for cell in schedule.class_cells() {
            if cell.slot.window()?.contains(minute) {
                return Ok(Some(cell.slot.clone()));
            }
        }
        Ok(None)
    }

    pub fn next_slot(
        &self,
        now: DateTime<Utc>,
        week: &WeekSchedule,
    ) -> Result<Option<NextClass>, ScheduleError> {
        let order = &self.calendar.class_days;
        let Some(today) = self.current_day_name(now) else {
            // Non-class day: anchor at the first class day of the week.
            for day in order {
                if let Some(found) = first_class_of_day(week, *day)? {
                    return Ok(Some(found));
                }
            }
            return Ok(None);
        };

        let minute = self.minute_of_day(now);
        if let Some(schedule) = week.day(today) {
            for cell in schedule.class_cells() {
                let window = cell.slot.window()?;
                let Some(entry) = cell.entry.as_ref() else {
                    continue;
                };
                if window.start_minute > minute {
                    return Ok(Some(NextClass {
                        day: today,
                        slot: cell.slot.clone(),
                        entry: entry.clone(),
                    }));
                }
            }
        }

        let start = order.iter().position(|day| *day == today).unwrap_or(0);
        for offset in 1..=order.len() {
            let day = order[(start + offset) % order.len()];
            if let Some(found) = first_class_of_day(week, day)? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    pub fn slot_has_ended(&self, now: DateTime<Utc>, slot: &SlotId) -> Result<bool, ScheduleError> {
        Ok(slot.window()?.has_ended(self.minute_of_day(now)))
    }

    /// Presentation hints for one render pass. A malformed slot yields an
    /// empty highlight rather than an error.
    pub fn highlight(&self, now: DateTime<Utc>, week: &WeekSchedule) -> HighlightState {
        match self.try_highlight(now, week) {
            Ok(state) => state,
            Err(error) => {
                warn!(%error, "skipping timetable highlight");
                HighlightState::default()
            }
        }
    }

    fn try_highlight(
        &self,
        now: DateTime<Utc>,
        week: &WeekSchedule,
    ) -> Result<HighlightState, ScheduleError> {
        let day = self.current_day_name(now);
        let mut state = HighlightState {
            day,
            next: self.next_slot(now, week)?,
            ..HighlightState::default()
        };

        let Some(schedule) = day.and_then(|day| week.day(day)) else {
            return Ok(state);
        };

        state.active_slot = self.active_slot(now, schedule)?;
        state.active_entry = state
            .active_slot
            .as_ref()
            .and_then(|slot| schedule.cell(slot))
            .and_then(|cell| cell.entry.clone());
        for cell in schedule.class_cells() {
            if self.slot_has_ended(now, &cell.slot)? {
                state.ended_slots.push(cell.slot.clone());
            }
        }
        Ok(state)
    }

    fn minute_of_day(&self, now: DateTime<Utc>) -> u32 {
        let local = now.with_timezone(&self.timezone);
        local.hour() * 60 + local.minute()
    }
}

fn first_class_of_day(week: &WeekSchedule, day: DayName) -> Result<Option<NextClass>, ScheduleError> {
    let Some(schedule) = week.day(day) else {
        return Ok(None);
    };
    for cell in schedule.class_cells() {
        cell.slot.window()?;
        if let Some(entry) = cell.entry.as_ref() {
            return Ok(Some(NextClass {
                day,
                slot: cell.slot.clone(),
                entry: entry.clone(),
            }));
        }
    }
    Ok(None)
}
