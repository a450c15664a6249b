pub mod baseline;
pub mod error;
pub mod models;
pub mod reconcile;
pub mod time_window;
