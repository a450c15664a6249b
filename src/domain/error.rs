use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("invalid slot '{0}': expected HH:MM-HH:MM")]
    Format(String),
    #[error("slot {0} is a break and cannot be modified")]
    ImmutableSlot(String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("no cell for {day} {slot}")]
    UnknownCell { day: String, slot: String },
}
