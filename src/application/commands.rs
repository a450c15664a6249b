use crate::application::bootstrap::{bootstrap_workspace, BootstrapResult};
use crate::application::identity::{Identity, IdentityProvider, SessionIdentityProvider};
use crate::application::request_sequencer::RequestSequencer;
use crate::application::scheduler::{DebouncedSaver, HighlightTicker, ProfilePoller, SectionFollower};
use crate::application::shared_state::SharedSelection;
use crate::application::timetable_service::TimetableService;
use crate::domain::baseline::baseline_section;
use crate::domain::models::{Course, DayName, Room, ScheduleEntry, Section, SlotId, UserProfile, WeekSchedule};
use crate::domain::reconcile::filter_records;
use crate::domain::time_window::{HighlightState, NowProvider, TimeWindowEvaluator};
use crate::infrastructure::config::AppSettings;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::record_store::{RecordStore, SqliteRecordStore};
use crate::infrastructure::rest_store::{RestRecordStore, RestStoreConfig};
use crate::infrastructure::session_store::{KeyringSessionStore, SessionStore};
use chrono::Utc;
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

const SESSION_LIFETIME_HOURS: i64 = 24 * 7;

pub struct AppState {
    logs_dir: PathBuf,
    settings: AppSettings,
    evaluator: Arc<TimeWindowEvaluator>,
    service: Arc<TimetableService<dyn RecordStore>>,
    identity: Arc<SessionIdentityProvider<dyn SessionStore>>,
    selection: SharedSelection,
    profile_sequencer: RequestSequencer,
    section_sequencer: RequestSequencer,
    grid: Arc<watch::Sender<WeekSchedule>>,
    runtime: Mutex<RuntimeState>,
    log_guard: Mutex<()>,
}

impl AppState {
    /// Opens the workspace with the configured store (REST when a store URL
    /// is set, otherwise the local SQLite file) and the OS keychain session.
    pub fn new(workspace_root: PathBuf) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        let store: Arc<dyn RecordStore> =
            match RestStoreConfig::from_env(bootstrap.settings.store_url.as_deref())? {
                Some(config) => Arc::new(RestRecordStore::new(config)),
                None => Arc::new(SqliteRecordStore::open(&bootstrap.database_path)?),
            };
        Self::assemble(
            bootstrap,
            store,
            Arc::new(KeyringSessionStore::default()),
            Arc::new(Utc::now),
        )
    }

    pub fn with_clock(
        workspace_root: PathBuf,
        store: Arc<dyn RecordStore>,
        sessions: Arc<dyn SessionStore>,
        now_provider: NowProvider,
    ) -> Result<Self, InfraError> {
        let bootstrap = bootstrap_workspace(&workspace_root)?;
        Self::assemble(bootstrap, store, sessions, now_provider)
    }

    fn assemble(
        bootstrap: BootstrapResult,
        store: Arc<dyn RecordStore>,
        sessions: Arc<dyn SessionStore>,
        now_provider: NowProvider,
    ) -> Result<Self, InfraError> {
        let BootstrapResult {
            logs_dir,
            settings,
            calendar,
            ..
        } = bootstrap;
        let evaluator = TimeWindowEvaluator::new(calendar, settings.timezone)
            .with_now_provider(Arc::clone(&now_provider));
        let identity = SessionIdentityProvider::new(sessions).with_now_provider(now_provider);
        let selection = SharedSelection::new(&settings.default_section)?;
        let initial_grid = baseline_section(&settings.default_section)
            .map(|section| section.schedule)
            .ok_or_else(|| {
                InfraError::InvalidConfig(format!("unknown default section {}", settings.default_section))
            })?;
        let (grid, _) = watch::channel(initial_grid);

        let state = Self {
            logs_dir,
            settings,
            evaluator: Arc::new(evaluator),
            service: Arc::new(TimetableService::new(store)),
            identity: Arc::new(identity),
            selection,
            profile_sequencer: RequestSequencer::default(),
            section_sequencer: RequestSequencer::default(),
            grid: Arc::new(grid),
            runtime: Mutex::new(RuntimeState::default()),
            log_guard: Mutex::new(()),
        };
        state.log_info(
            "open",
            &format!("{} ready, timezone={}", state.settings.app_name, state.settings.timezone),
        );
        Ok(state)
    }

    pub fn command_error(&self, command: &str, error: &InfraError) -> String {
        self.log_error(command, &error.to_string());
        error.to_string()
    }

    pub fn log_info(&self, command: &str, message: &str) {
        self.append_log("info", command, message);
    }

    pub fn log_error(&self, command: &str, message: &str) {
        self.append_log("error", command, message);
    }

    fn append_log(&self, level: &str, command: &str, message: &str) {
        let Ok(_guard) = self.log_guard.lock() else {
            return;
        };
        let path = self.logs_dir.join("commands.log");
        let payload = serde_json::json!({
            "timestamp": Utc::now().to_rfc3339(),
            "level": level,
            "command": command,
            "message": message,
        });

        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", payload);
        }
    }
}

#[derive(Default)]
struct RuntimeState {
    section: Option<Section>,
    degraded: bool,
    saver: Option<(String, DebouncedSaver)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub signed_in: bool,
    pub identity: Option<Identity>,
    pub section: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordListResponse<T> {
    pub items: Vec<T>,
    pub degraded: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SectionResponse {
    pub section: Section,
    pub degraded: bool,
}

/// Timers a view keeps alive while it is open. Dropping this stops them.
pub struct BackgroundTimers {
    pub highlight: HighlightTicker,
    pub profile_poller: ProfilePoller,
    pub section_follower: SectionFollower,
}

pub async fn sign_in_impl(
    state: &AppState,
    user_id: String,
    email: Option<String>,
    display_name: Option<String>,
) -> Result<SessionResponse, InfraError> {
    let identity = state.identity.sign_in(
        &user_id,
        email,
        display_name,
        chrono::Duration::hours(SESSION_LIFETIME_HOURS),
    )?;

    // The session is already stored; a bad profile must not fail the sign-in.
    match state.service.load_profile(&identity.user_id).await {
        Ok(Some(profile)) => {
            if let Err(error) = state.selection.publish(&profile.section) {
                state.log_error(
                    "sign_in",
                    &format!("profile section {} not usable: {error}", profile.section),
                );
            }
        }
        Ok(None) => {}
        Err(error) => {
            state.log_error("sign_in", &format!("profile unavailable: {error}"));
        }
    }

    state.log_info("sign_in", &format!("signed in user_id={}", identity.user_id));
    Ok(SessionResponse {
        signed_in: true,
        identity: Some(identity),
        section: state.selection.current(),
    })
}

pub async fn sign_out_impl(state: &AppState) -> Result<SessionResponse, InfraError> {
    flush_edits_impl(state).await?;
    state.identity.sign_out()?;
    lock_runtime(state)?.section = None;

    state.log_info("sign_out", "signed out");
    Ok(SessionResponse {
        signed_in: false,
        identity: None,
        section: state.selection.current(),
    })
}

pub fn session_impl(state: &AppState) -> Result<SessionResponse, InfraError> {
    let identity = state.identity.current_identity()?;
    Ok(SessionResponse {
        signed_in: identity.is_some(),
        identity,
        section: state.selection.current(),
    })
}

pub async fn list_courses_impl(
    state: &AppState,
    query: Option<String>,
) -> Result<RecordListResponse<Course>, InfraError> {
    let owner = current_owner(state)?;
    let loaded = state.service.effective_courses(owner.as_deref()).await?;
    if loaded.degraded {
        state.log_error("list_courses", "store unavailable; showing last known courses");
    }
    Ok(RecordListResponse {
        items: filter_records(&loaded.value, query.as_deref().unwrap_or_default()),
        degraded: loaded.degraded,
    })
}

pub async fn create_course_impl(state: &AppState, course: Course) -> Result<Course, InfraError> {
    let owner = require_signed_in(state)?;
    let created = state.service.create_course_override(&owner, &course).await?;
    state.log_info("create_course", &format!("created course code={}", created.code));
    Ok(created)
}

pub async fn update_course_impl(state: &AppState, id: String, course: Course) -> Result<Course, InfraError> {
    let owner = require_signed_in(state)?;
    let updated = state.service.update_course_override(&owner, &id, &course).await?;
    state.log_info("update_course", &format!("updated course id={id}"));
    Ok(updated)
}

pub async fn delete_course_impl(state: &AppState, id: String) -> Result<(), InfraError> {
    let owner = require_signed_in(state)?;
    state.service.delete_course_override(&owner, &id).await?;
    state.log_info("delete_course", &format!("deleted course id={id}"));
    Ok(())
}

pub async fn list_rooms_impl(
    state: &AppState,
    query: Option<String>,
) -> Result<RecordListResponse<Room>, InfraError> {
    let owner = current_owner(state)?;
    let loaded = state.service.effective_rooms(owner.as_deref()).await?;
    if loaded.degraded {
        state.log_error("list_rooms", "store unavailable; showing last known rooms");
    }
    Ok(RecordListResponse {
        items: filter_records(&loaded.value, query.as_deref().unwrap_or_default()),
        degraded: loaded.degraded,
    })
}

pub async fn create_room_impl(state: &AppState, room: Room) -> Result<Room, InfraError> {
    let owner = require_signed_in(state)?;
    let created = state.service.create_room_override(&owner, &room).await?;
    state.log_info("create_room", &format!("created room name={}", created.name));
    Ok(created)
}

pub async fn update_room_impl(state: &AppState, id: String, room: Room) -> Result<Room, InfraError> {
    let owner = require_signed_in(state)?;
    let updated = state.service.update_room_override(&owner, &id, &room).await?;
    state.log_info("update_room", &format!("updated room id={id}"));
    Ok(updated)
}

pub async fn delete_room_impl(state: &AppState, id: String) -> Result<(), InfraError> {
    let owner = require_signed_in(state)?;
    state.service.delete_room_override(&owner, &id).await?;
    state.log_info("delete_room", &format!("deleted room id={id}"));
    Ok(())
}

pub async fn select_section_impl(state: &AppState, section: String) -> Result<SectionResponse, InfraError> {
    state.selection.publish(&section)?;
    state.log_info("select_section", &format!("selected section={}", section.trim()));
    load_section_impl(state).await
}

/// Loads the selected section. A response that lost the race against a newer
/// load is returned to the caller but not applied.
pub async fn load_section_impl(state: &AppState) -> Result<SectionResponse, InfraError> {
    let section_name = state.selection.current();
    let owner = current_owner(state)?;
    let ticket = state.section_sequencer.issue();
    let loaded = state.service.load_section(owner.as_deref(), &section_name).await?;

    let response = SectionResponse {
        section: loaded.value.clone(),
        degraded: loaded.degraded,
    };
    let mut apply_error = None;
    state.section_sequencer.apply_if_current(ticket, loaded, |loaded| {
        if let Err(error) = apply_section(state, loaded.value, loaded.degraded) {
            apply_error = Some(error);
        }
    });
    if let Some(error) = apply_error {
        return Err(error);
    }
    if response.degraded {
        state.log_error("load_section", "saved timetable unavailable; showing fallback grid");
    }
    Ok(response)
}

/// Replaces one cell of the shown grid. Signed-in edits are persisted by the
/// debounced saver.
pub async fn edit_cell_impl(
    state: &AppState,
    day: String,
    slot: String,
    entry: Option<ScheduleEntry>,
) -> Result<Section, InfraError> {
    let day_name = DayName::parse(&day)
        .ok_or_else(|| InfraError::Validation(format!("unknown day: {}", day.trim())))?;
    let slot = SlotId::new(slot);
    let mut section = active_section(state).await?;
    section.schedule.set_cell(day_name, &slot, entry)?;

    let degraded = lock_runtime(state)?.degraded;
    apply_section(state, section.clone(), degraded)?;
    if let Some(owner) = current_owner(state)? {
        submit_edit(state, &owner, section.clone())?;
    }

    state.log_info("edit_cell", &format!("section={} day={day_name} slot={slot}", section.name));
    Ok(section)
}

/// Writes any debounced edit now.
pub async fn flush_edits_impl(state: &AppState) -> Result<(), InfraError> {
    let saver = lock_runtime(state)?.saver.take();
    if let Some((_, saver)) = saver {
        saver.flush().await;
        state.log_info("flush_edits", "pending edits written");
    }
    Ok(())
}

pub async fn reset_section_impl(state: &AppState) -> Result<SectionResponse, InfraError> {
    let owner = require_signed_in(state)?;
    // Pending edits would re-create the override after the reset.
    drop(lock_runtime(state)?.saver.take());

    let section = state
        .service
        .reset_section(&owner, &state.selection.current())
        .await?;
    apply_section(state, section.clone(), false)?;
    state.log_info("reset_section", &format!("reset section={}", section.name));
    Ok(SectionResponse {
        section,
        degraded: false,
    })
}

pub async fn get_highlight_impl(state: &AppState) -> Result<HighlightState, InfraError> {
    let section = active_section(state).await?;
    Ok(state
        .evaluator
        .highlight(state.evaluator.now(), &section.schedule))
}

pub async fn load_profile_impl(state: &AppState) -> Result<Option<UserProfile>, InfraError> {
    let owner = require_signed_in(state)?;
    state.service.load_profile(&owner).await
}

pub async fn onboard_impl(state: &AppState, profile: UserProfile) -> Result<UserProfile, InfraError> {
    let owner = require_signed_in(state)?;
    let created = state.service.onboard(&owner, profile).await?;
    state.selection.publish(&created.section)?;
    state.log_info("onboard", &format!("onboarded user_id={owner}"));
    Ok(created)
}

pub async fn update_profile_impl(state: &AppState, profile: UserProfile) -> Result<UserProfile, InfraError> {
    let owner = require_signed_in(state)?;
    let updated = state.service.update_profile(&owner, profile).await?;
    state.selection.publish(&updated.section)?;
    state.log_info("update_profile", &format!("updated profile user_id={owner}"));
    Ok(updated)
}

pub async fn delete_account_impl(state: &AppState) -> Result<usize, InfraError> {
    let owner = require_signed_in(state)?;
    drop(lock_runtime(state)?.saver.take());

    let deleted = state.service.delete_account(&owner).await?;
    state.identity.sign_out()?;
    lock_runtime(state)?.section = None;
    state.selection.publish(&state.settings.default_section)?;

    state.log_info("delete_account", &format!("deleted user_id={owner} records={deleted}"));
    Ok(deleted)
}

/// Must be called inside a tokio runtime.
pub fn start_timers_impl(state: &AppState) -> BackgroundTimers {
    let identity: Arc<dyn IdentityProvider> = state.identity.clone();
    let timers = BackgroundTimers {
        highlight: HighlightTicker::spawn(
            Arc::clone(&state.evaluator),
            state.grid.subscribe(),
            state.settings.highlight_interval,
        ),
        profile_poller: ProfilePoller::spawn(
            Arc::clone(&state.service),
            Arc::clone(&identity),
            state.selection.clone(),
            state.profile_sequencer.clone(),
            state.settings.poll_interval,
        ),
        section_follower: SectionFollower::spawn(
            Arc::clone(&state.service),
            identity,
            state.selection.clone(),
            state.section_sequencer.clone(),
            Arc::clone(&state.grid),
        ),
    };
    state.log_info("start_timers", "highlight, profile poll and section follower started");
    timers
}

async fn active_section(state: &AppState) -> Result<Section, InfraError> {
    let selected = state.selection.current();
    {
        let runtime = lock_runtime(state)?;
        if let Some(section) = runtime
            .section
            .as_ref()
            .filter(|section| section.name.eq_ignore_ascii_case(&selected))
        {
            return Ok(section.clone());
        }
    }
    Ok(load_section_impl(state).await?.section)
}

fn apply_section(state: &AppState, section: Section, degraded: bool) -> Result<(), InfraError> {
    state.grid.send_replace(section.schedule.clone());
    let mut runtime = lock_runtime(state)?;
    runtime.section = Some(section);
    runtime.degraded = degraded;
    Ok(())
}

fn submit_edit(state: &AppState, owner: &str, section: Section) -> Result<(), InfraError> {
    let mut runtime = lock_runtime(state)?;
    let reusable = matches!(&runtime.saver, Some((saver_owner, _)) if saver_owner == owner);
    if !reusable {
        if let Some((_, previous)) = runtime.saver.take() {
            tokio::spawn(previous.flush());
        }
        let saver = DebouncedSaver::spawn(
            Arc::clone(&state.service),
            owner.to_string(),
            state.settings.save_debounce,
        );
        runtime.saver = Some((owner.to_string(), saver));
    }

    match runtime.saver.as_ref() {
        Some((_, saver)) => saver.submit(section),
        None => Err(InfraError::Store("debounced saver unavailable".to_string())),
    }
}

fn current_owner(state: &AppState) -> Result<Option<String>, InfraError> {
    Ok(state
        .identity
        .current_identity()?
        .map(|identity| identity.user_id))
}

fn require_signed_in(state: &AppState) -> Result<String, InfraError> {
    current_owner(state)?.ok_or_else(|| InfraError::Credential("sign in required".to_string()))
}

fn lock_runtime(state: &AppState) -> Result<MutexGuard<'_, RuntimeState>, InfraError> {
    state
        .runtime
        .lock()
        .map_err(|error| InfraError::Store(format!("runtime lock poisoned: {error}")))
}
