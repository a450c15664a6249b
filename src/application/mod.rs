pub mod bootstrap;
pub mod commands;
pub mod identity;
pub mod request_sequencer;
pub mod scheduler;
pub mod shared_state;
pub mod timetable_service;
