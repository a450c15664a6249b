pub mod application;
pub mod domain;
pub mod infrastructure;

use application::commands::{
    edit_cell_impl, flush_edits_impl, get_highlight_impl, list_courses_impl, list_rooms_impl,
    load_section_impl, reset_section_impl, select_section_impl, session_impl, sign_in_impl,
    sign_out_impl, start_timers_impl, AppState,
};
use clap::{Parser, Subcommand};
use domain::models::ScheduleEntry;
use infrastructure::error::InfraError;
use serde::Serialize;
use std::path::PathBuf;

pub use application::commands::{RecordListResponse, SectionResponse, SessionResponse};
pub use domain::time_window::HighlightState;

#[derive(Debug, Parser)]
#[command(author, version, about = "Class timetable desk")]
pub struct Cli {
    /// Workspace holding config/, state/ and logs/ (defaults to the current directory)
    #[arg(long, global = true)]
    pub workspace: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Current and next class for the selected section (default)
    Highlight,
    /// Print the highlight every time it changes
    Watch,
    /// Show who is signed in
    Session,
    /// Start a session
    SignIn {
        user_id: String,
        email: Option<String>,
        #[arg(long)]
        display_name: Option<String>,
    },
    /// End the session
    SignOut,
    /// Show the selected section, or switch to another one
    Section { name: Option<String> },
    /// Put a class into one slot
    Edit {
        day: String,
        slot: String,
        code: String,
        subject: String,
        /// Several instructors are joined with `+`
        #[arg(num_args = 1.., required = true)]
        instructor: Vec<String>,
    },
    /// Make a slot a free period
    Clear { day: String, slot: String },
    /// Drop saved edits of the selected section
    Reset,
    /// List courses, optionally filtered
    Courses { query: Option<String> },
    /// List rooms, optionally filtered
    Rooms { query: Option<String> },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Highlight => "highlight",
            Command::Watch => "watch",
            Command::Session => "session",
            Command::SignIn { .. } => "sign_in",
            Command::SignOut => "sign_out",
            Command::Section { .. } => "section",
            Command::Edit { .. } => "edit_cell",
            Command::Clear { .. } => "clear_cell",
            Command::Reset => "reset_section",
            Command::Courses { .. } => "list_courses",
            Command::Rooms { .. } => "list_rooms",
        }
    }
}

/// Runs one command against the workspace and prints its result as JSON.
pub async fn run(cli: Cli) -> Result<(), String> {
    let workspace_root = match cli.workspace {
        Some(path) => path,
        None => std::env::current_dir().map_err(|error| error.to_string())?,
    };
    let state = AppState::new(workspace_root).map_err(|error| error.to_string())?;

    let command = cli.command.unwrap_or(Command::Highlight);
    let name = command.name();
    dispatch(&state, command)
        .await
        .map_err(|error| state.command_error(name, &error))
}

async fn dispatch(state: &AppState, command: Command) -> Result<(), InfraError> {
    match command {
        Command::Highlight => print_json(&get_highlight_impl(state).await?),
        Command::Watch => watch_highlight(state).await,
        Command::Session => print_json(&session_impl(state)?),
        Command::SignIn {
            user_id,
            email,
            display_name,
        } => print_json(&sign_in_impl(state, user_id, email, display_name).await?),
        Command::SignOut => print_json(&sign_out_impl(state).await?),
        Command::Section { name: Some(name) } => print_json(&select_section_impl(state, name).await?),
        Command::Section { name: None } => print_json(&load_section_impl(state).await?),
        Command::Edit {
            day,
            slot,
            code,
            subject,
            instructor,
        } => {
            let entry = ScheduleEntry::new(code, subject, instructor.join(" "));
            let section = edit_cell_impl(state, day, slot, Some(entry)).await?;
            flush_edits_impl(state).await?;
            print_json(&section)
        }
        Command::Clear { day, slot } => {
            let section = edit_cell_impl(state, day, slot, None).await?;
            flush_edits_impl(state).await?;
            print_json(&section)
        }
        Command::Reset => print_json(&reset_section_impl(state).await?),
        Command::Courses { query } => print_json(&list_courses_impl(state, query).await?),
        Command::Rooms { query } => print_json(&list_rooms_impl(state, query).await?),
    }
}

async fn watch_highlight(state: &AppState) -> Result<(), InfraError> {
    load_section_impl(state).await?;
    let timers = start_timers_impl(state);
    let mut highlights = timers.highlight.subscribe();
    print_json(&*highlights.borrow_and_update())?;
    while highlights.changed().await.is_ok() {
        let current = highlights.borrow_and_update().clone();
        print_json(&current)?;
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), InfraError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_means_highlight() {
        let cli = Cli::try_parse_from(["timetable-desk"]).expect("parse");
        assert!(cli.command.is_none());
        assert!(cli.workspace.is_none());
    }

    #[test]
    fn edit_collects_multi_word_instructor() {
        let cli = Cli::try_parse_from([
            "timetable-desk",
            "--workspace",
            "/tmp/desk",
            "edit",
            "Tuesday",
            "09:30-10:20",
            "CSE-3105",
            "Networks",
            "Dr.",
            "Rahman",
        ])
        .expect("parse");
        assert_eq!(cli.workspace, Some(PathBuf::from("/tmp/desk")));
        match cli.command {
            Some(Command::Edit {
                day, slot, instructor, ..
            }) => {
                assert_eq!(day, "Tuesday");
                assert_eq!(slot, "09:30-10:20");
                assert_eq!(instructor.join(" "), "Dr. Rahman");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn edit_without_instructor_is_rejected() {
        let result = Cli::try_parse_from(["timetable-desk", "edit", "Tuesday", "09:30-10:20", "CSE-3105", "Networks"]);
        assert!(result.is_err());
    }

    #[test]
    fn sign_in_takes_optional_email() {
        let cli = Cli::try_parse_from(["timetable-desk", "sign-in", "uid-1", "a@example.edu"]).expect("parse");
        match cli.command {
            Some(Command::SignIn { user_id, email, display_name }) => {
                assert_eq!(user_id, "uid-1");
                assert_eq!(email.as_deref(), Some("a@example.edu"));
                assert_eq!(display_name, None);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
