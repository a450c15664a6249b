use crate::domain::error::ScheduleError;
use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Label of the protected break slot inside every day grid.
pub const BREAK_SLOT: &str = "LUNCH";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DayName {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl DayName {
    pub const ALL: [DayName; 7] = [
        DayName::Monday,
        DayName::Tuesday,
        DayName::Wednesday,
        DayName::Thursday,
        DayName::Friday,
        DayName::Saturday,
        DayName::Sunday,
    ];

    pub fn from_weekday(weekday: Weekday) -> Self {
        match weekday {
            Weekday::Mon => DayName::Monday,
            Weekday::Tue => DayName::Tuesday,
            Weekday::Wed => DayName::Wednesday,
            Weekday::Thu => DayName::Thursday,
            Weekday::Fri => DayName::Friday,
            Weekday::Sat => DayName::Saturday,
            Weekday::Sun => DayName::Sunday,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DayName::Monday => "Monday",
            DayName::Tuesday => "Tuesday",
            DayName::Wednesday => "Wednesday",
            DayName::Thursday => "Thursday",
            DayName::Friday => "Friday",
            DayName::Saturday => "Saturday",
            DayName::Sunday => "Sunday",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|day| day.as_str().eq_ignore_ascii_case(value))
    }
}

impl fmt::Display for DayName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier of a column in the daily grid, e.g. `09:30-10:20` or `LUNCH`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct SlotId(String);

impl SlotId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_break(&self) -> bool {
        self.0.eq_ignore_ascii_case(BREAK_SLOT)
    }

    pub fn window(&self) -> Result<SlotWindow, ScheduleError> {
        SlotWindow::parse(&self.0)
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Half-open `[start, end)` window in minutes since midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotWindow {
    pub start_minute: u32,
    pub end_minute: u32,
}

impl SlotWindow {
    pub fn parse(value: &str) -> Result<Self, ScheduleError> {
        let format_error = || ScheduleError::Format(value.to_string());
        let (start, end) = value.split_once('-').ok_or_else(format_error)?;
        let start_minute = parse_hhmm_minutes(start).ok_or_else(format_error)?;
        let end_minute = parse_hhmm_minutes(end).ok_or_else(format_error)?;
        if end_minute <= start_minute {
            return Err(format_error());
        }
        Ok(Self {
            start_minute,
            end_minute,
        })
    }

    pub fn contains(&self, minute: u32) -> bool {
        self.start_minute <= minute && minute < self.end_minute
    }

    pub fn has_ended(&self, minute: u32) -> bool {
        self.end_minute <= minute
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub course_code: String,
    pub subject_name: String,
    /// One name, or several joined with `+`.
    pub instructor: String,
}

impl ScheduleEntry {
    pub fn new(
        course_code: impl Into<String>,
        subject_name: impl Into<String>,
        instructor: impl Into<String>,
    ) -> Self {
        Self {
            course_code: course_code.into(),
            subject_name: subject_name.into(),
            instructor: instructor.into(),
        }
    }

    pub fn instructors(&self) -> Vec<&str> {
        self.instructor
            .split('+')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .collect()
    }

    pub fn validate(&self) -> Result<(), ScheduleError> {
        validate_non_empty(&self.course_code, "entry.course_code")?;
        validate_non_empty(&self.subject_name, "entry.subject_name")?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SlotCell {
    pub slot: SlotId,
    pub entry: Option<ScheduleEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DaySchedule {
    pub day: DayName,
    pub cells: Vec<SlotCell>,
}

impl DaySchedule {
    pub fn cell(&self, slot: &SlotId) -> Option<&SlotCell> {
        self.cells.iter().find(|cell| &cell.slot == slot)
    }

    pub fn class_cells(&self) -> impl Iterator<Item = &SlotCell> {
        self.cells.iter().filter(|cell| !cell.slot.is_break())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WeekSchedule {
    pub days: Vec<DaySchedule>,
}

impl WeekSchedule {
    /// Builds an all-free grid with the same slot columns on every day.
    pub fn empty(days: &[DayName], slots: &[&str]) -> Self {
        Self {
            days: days
                .iter()
                .map(|day| DaySchedule {
                    day: *day,
                    cells: slots
                        .iter()
                        .map(|slot| SlotCell {
                            slot: SlotId::new(*slot),
                            entry: None,
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    pub fn day(&self, day: DayName) -> Option<&DaySchedule> {
        self.days.iter().find(|schedule| schedule.day == day)
    }

    pub fn entry_at(&self, day: DayName, slot: &SlotId) -> Result<Option<&ScheduleEntry>, ScheduleError> {
        self.day(day)
            .and_then(|schedule| schedule.cell(slot))
            .map(|cell| cell.entry.as_ref())
            .ok_or_else(|| unknown_cell(day, slot))
    }

    /// Replaces exactly one cell. `None` clears it to a free period.
    pub fn set_cell(
        &mut self,
        day: DayName,
        slot: &SlotId,
        entry: Option<ScheduleEntry>,
    ) -> Result<(), ScheduleError> {
        if slot.is_break() {
            return Err(ScheduleError::ImmutableSlot(slot.to_string()));
        }
        if let Some(entry) = entry.as_ref() {
            entry.validate()?;
        }

        let cell = self
            .days
            .iter_mut()
            .find(|schedule| schedule.day == day)
            .and_then(|schedule| schedule.cells.iter_mut().find(|cell| &cell.slot == slot))
            .ok_or_else(|| unknown_cell(day, slot))?;
        cell.entry = entry;
        Ok(())
    }

    /// Checks that every non-break column parses as a time window and that
    /// break columns stay empty.
    pub fn validate(&self) -> Result<(), ScheduleError> {
        for schedule in &self.days {
            for cell in &schedule.cells {
                if cell.slot.is_break() {
                    if cell.entry.is_some() {
                        return Err(ScheduleError::ImmutableSlot(cell.slot.to_string()));
                    }
                    continue;
                }
                cell.slot.window()?;
                if let Some(entry) = cell.entry.as_ref() {
                    entry.validate()?;
                }
            }
        }
        Ok(())
    }

    /// Valid, and laid out exactly like `layout`: the same days and the same
    /// slot columns, in the same order.
    pub fn validate_against(&self, layout: &WeekSchedule) -> Result<(), ScheduleError> {
        self.validate()?;
        let same_days = self.days.len() == layout.days.len()
            && self
                .days
                .iter()
                .zip(&layout.days)
                .all(|(schedule, expected)| schedule.day == expected.day);
        if !same_days {
            return Err(ScheduleError::Validation(
                "grid days differ from the section layout".to_string(),
            ));
        }
        for (schedule, expected) in self.days.iter().zip(&layout.days) {
            let same_slots = schedule.cells.len() == expected.cells.len()
                && schedule
                    .cells
                    .iter()
                    .zip(&expected.cells)
                    .all(|(cell, expected)| cell.slot == expected.slot);
            if !same_slots {
                return Err(ScheduleError::Validation(format!(
                    "{} slots differ from the section layout",
                    schedule.day
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Section {
    pub name: String,
    pub room: String,
    pub schedule: WeekSchedule,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CourseType {
    Theory,
    Lab,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Course {
    /// Store record id; `None` for baseline courses.
    pub id: Option<String>,
    pub code: String,
    pub title: String,
    pub instructor: String,
    pub credits: f32,
    pub course_type: CourseType,
}

impl Course {
    pub fn validate(&self) -> Result<(), ScheduleError> {
        validate_non_empty(&self.code, "course.code")?;
        validate_non_empty(&self.title, "course.title")?;
        if self.credits.is_nan() || self.credits < 0.0 {
            return Err(ScheduleError::Validation(
                "course.credits must be >= 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoomKind {
    Classroom,
    Lab,
    Seminar,
    Office,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Room {
    pub id: Option<String>,
    pub name: String,
    pub building: String,
    pub floor: Option<i32>,
    pub capacity: u32,
    pub kind: RoomKind,
}

impl Room {
    pub fn validate(&self) -> Result<(), ScheduleError> {
        validate_non_empty(&self.name, "room.name")?;
        validate_non_empty(&self.building, "room.building")?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    pub id: Option<String>,
    pub user_id: String,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub department: Option<String>,
    pub section: String,
    pub roll_number: Option<String>,
    pub registration_number: Option<String>,
    pub semester: Option<u8>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl UserProfile {
    pub fn validate(&self) -> Result<(), ScheduleError> {
        validate_non_empty(&self.user_id, "profile.user_id")?;
        validate_non_empty(&self.full_name, "profile.full_name")?;
        validate_non_empty(&self.email, "profile.email")?;
        validate_non_empty(&self.section, "profile.section")?;
        let email = self.email.trim();
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
            _ => Err(ScheduleError::Validation(
                "profile.email must be an email address".to_string(),
            )),
        }
    }
}

/// Signed-in identity as handed over by the authentication provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuthSession {
    pub user_id: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl AuthSession {
    pub fn is_valid_at(&self, now: DateTime<Utc>, leeway_seconds: i64) -> bool {
        self.expires_at > now + chrono::Duration::seconds(leeway_seconds)
            && !self.user_id.trim().is_empty()
    }
}

pub(crate) fn validate_non_empty(value: &str, field_name: &str) -> Result<(), ScheduleError> {
    if value.trim().is_empty() {
        return Err(ScheduleError::Validation(format!(
            "{field_name} must not be empty"
        )));
    }
    Ok(())
}

fn parse_hhmm_minutes(value: &str) -> Option<u32> {
    let (hour, minute) = value.trim().split_once(':')?;
    if hour.is_empty() || hour.len() > 2 || minute.len() != 2 {
        return None;
    }
    let hour = hour.parse::<u32>().ok()?;
    let minute = minute.parse::<u32>().ok()?;
    if hour > 23 || minute > 59 {
        return None;
    }
    Some(hour * 60 + minute)
}

fn unknown_cell(day: DayName, slot: &SlotId) -> ScheduleError {
    ScheduleError::UnknownCell {
        day: day.to_string(),
        slot: slot.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SLOTS: [&str; 3] = ["09:30-10:20", "LUNCH", "13:40-14:30"];

    fn sample_week() -> WeekSchedule {
        let mut week = WeekSchedule::empty(&[DayName::Sunday, DayName::Tuesday], &SLOTS);
        week.set_cell(
            DayName::Tuesday,
            &SlotId::new("09:30-10:20"),
            Some(ScheduleEntry::new("CSE-301", "Databases", "RKH")),
        )
        .expect("seed entry");
        week
    }

    #[test]
    fn slot_window_parses_and_is_half_open() {
        let window = SlotWindow::parse("09:30-10:20").expect("valid slot");
        assert_eq!(window.start_minute, 570);
        assert_eq!(window.end_minute, 620);
        assert!(window.contains(570));
        assert!(!window.contains(569));
        assert!(!window.contains(620));
        assert!(window.has_ended(620));
        assert!(!window.has_ended(619));
    }

    #[test]
    fn slot_window_rejects_malformed_values() {
        for raw in ["LUNCH", "09:30", "9-10", "09:30-25:00", "10:20-09:30", "09:3-10:20", ""] {
            assert_eq!(
                SlotWindow::parse(raw),
                Err(ScheduleError::Format(raw.to_string())),
                "{raw}"
            );
        }
    }

    #[test]
    fn break_slot_is_case_insensitive() {
        assert!(SlotId::new("lunch").is_break());
        assert!(SlotId::new(" LUNCH ").is_break());
        assert!(!SlotId::new("09:30-10:20").is_break());
    }

    #[test]
    fn edit_then_read_back_returns_new_entry() {
        let mut week = sample_week();
        let slot = SlotId::new("09:30-10:20");
        let replacement = ScheduleEntry::new("CSE-305", "Networks", "MAH+SRK");

        week.set_cell(DayName::Tuesday, &slot, Some(replacement.clone()))
            .expect("edit cell");

        assert_eq!(
            week.entry_at(DayName::Tuesday, &slot).expect("cell exists"),
            Some(&replacement)
        );
        assert_eq!(replacement.instructors(), vec!["MAH", "SRK"]);
    }

    #[test]
    fn clearing_a_cell_leaves_no_stale_entry() {
        let mut week = sample_week();
        let slot = SlotId::new("09:30-10:20");
        week.set_cell(DayName::Tuesday, &slot, None).expect("clear cell");
        week.set_cell(DayName::Tuesday, &slot, None).expect("clear is idempotent");
        assert_eq!(week.entry_at(DayName::Tuesday, &slot).expect("cell exists"), None);
    }

    #[test]
    fn lunch_slot_is_immutable() {
        let mut week = sample_week();
        let before = week.clone();
        let lunch = SlotId::new(BREAK_SLOT);

        let edit = week.set_cell(
            DayName::Tuesday,
            &lunch,
            Some(ScheduleEntry::new("CSE-301", "Databases", "RKH")),
        );
        let clear = week.set_cell(DayName::Tuesday, &lunch, None);

        assert_eq!(edit, Err(ScheduleError::ImmutableSlot("LUNCH".to_string())));
        assert_eq!(clear, Err(ScheduleError::ImmutableSlot("LUNCH".to_string())));
        assert_eq!(week, before);
    }

    #[test]
    fn grid_must_match_layout_and_keep_breaks_empty() {
        let layout = WeekSchedule::empty(&[DayName::Sunday, DayName::Tuesday], &SLOTS);
        assert_eq!(sample_week().validate_against(&layout), Ok(()));

        let mut lunch_taken = sample_week();
        lunch_taken.days[0].cells[1].entry =
            Some(ScheduleEntry::new("CSE-301", "Databases", "RKH"));
        assert_eq!(
            lunch_taken.validate(),
            Err(ScheduleError::ImmutableSlot("LUNCH".to_string()))
        );

        let missing_day = WeekSchedule::empty(&[DayName::Sunday], &SLOTS);
        assert!(matches!(
            missing_day.validate_against(&layout),
            Err(ScheduleError::Validation(_))
        ));

        let other_slots = WeekSchedule::empty(
            &[DayName::Sunday, DayName::Tuesday],
            &["09:30-10:20", "13:40-14:30"],
        );
        assert!(matches!(
            other_slots.validate_against(&layout),
            Err(ScheduleError::Validation(_))
        ));
    }

    #[test]
    fn unknown_cells_are_rejected() {
        let mut week = sample_week();
        let result = week.set_cell(DayName::Friday, &SlotId::new("09:30-10:20"), None);
        assert!(matches!(result, Err(ScheduleError::UnknownCell { .. })));
    }

    #[test]
    fn profile_validation_requires_name_and_email() {
        let mut profile = UserProfile {
            id: None,
            user_id: "uid-1".to_string(),
            full_name: "Nusrat Jahan".to_string(),
            email: "nusrat@example.edu".to_string(),
            phone: None,
            department: Some("CSE".to_string()),
            section: "CSE A".to_string(),
            roll_number: Some("2104001".to_string()),
            registration_number: None,
            semester: Some(5),
            updated_at: None,
        };
        assert!(profile.validate().is_ok());

        profile.email = "not-an-email".to_string();
        assert!(profile.validate().is_err());

        profile.email = "nusrat@example.edu".to_string();
        profile.full_name = "  ".to_string();
        assert!(profile.validate().is_err());
    }

    #[test]
    fn day_name_parses_case_insensitively() {
        assert_eq!(DayName::parse("tuesday"), Some(DayName::Tuesday));
        assert_eq!(DayName::parse(" SUNDAY "), Some(DayName::Sunday));
        assert_eq!(DayName::parse("Funday"), None);
    }

    #[test]
    fn week_schedule_supports_serde_roundtrip() {
        let week = sample_week();
        let roundtrip: WeekSchedule =
            serde_json::from_str(&serde_json::to_string(&week).expect("serialize week"))
                .expect("deserialize week");
        assert_eq!(roundtrip, week);
    }
}
