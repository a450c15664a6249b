use crate::application::identity::IdentityProvider;
use crate::application::request_sequencer::RequestSequencer;
use crate::application::shared_state::SharedSelection;
use crate::application::timetable_service::TimetableService;
use crate::domain::models::{Section, WeekSchedule};
use crate::domain::time_window::{HighlightState, TimeWindowEvaluator};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::record_store::RecordStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, warn};

/// Owns a background task and aborts it when stopped or dropped.
#[derive(Debug)]
pub struct TimerHandle {
    name: &'static str,
    task: JoinHandle<()>,
}

impl TimerHandle {
    fn new(name: &'static str, task: JoinHandle<()>) -> Self {
        Self { name, task }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn stop(self) {}
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        if !self.task.is_finished() {
            debug!(timer = self.name, "stopping timer");
        }
        self.task.abort();
    }
}

/// Re-evaluates the dashboard highlight every `period` and whenever the
/// shown grid changes.
pub struct HighlightTicker {
    states: watch::Receiver<HighlightState>,
    timer: TimerHandle,
}

impl HighlightTicker {
    pub fn spawn(
        evaluator: Arc<TimeWindowEvaluator>,
        mut schedule: watch::Receiver<WeekSchedule>,
        period: Duration,
    ) -> Self {
        let initial = {
            let week = schedule.borrow_and_update();
            evaluator.highlight(evaluator.now(), &week)
        };
        let (sender, states) = watch::channel(initial);

        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    changed = schedule.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }

                let state = {
                    let week = schedule.borrow_and_update();
                    evaluator.highlight(evaluator.now(), &week)
                };
                sender.send_if_modified(|current| {
                    if *current == state {
                        return false;
                    }
                    *current = state;
                    true
                });
            }
        });

        Self {
            states,
            timer: TimerHandle::new("highlight", task),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<HighlightState> {
        self.states.clone()
    }

    pub fn current(&self) -> HighlightState {
        self.states.borrow().clone()
    }

    pub fn stop(self) {
        self.timer.stop();
    }
}

/// Re-reads the signed-in user's profile and republishes their section when
/// it changed elsewhere.
pub struct ProfilePoller {
    timer: TimerHandle,
}

impl ProfilePoller {
    pub fn spawn<R>(
        service: Arc<TimetableService<R>>,
        identity: Arc<dyn IdentityProvider>,
        selection: SharedSelection,
        sequencer: RequestSequencer,
        period: Duration,
    ) -> Self
    where
        R: RecordStore + ?Sized + 'static,
    {
        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut last_seen = None;
            loop {
                ticker.tick().await;
                poll_profile_once(&service, identity.as_ref(), &selection, &sequencer, &mut last_seen).await;
            }
        });
        Self {
            timer: TimerHandle::new("profile-poller", task),
        }
    }

    pub fn is_running(&self) -> bool {
        !self.timer.is_finished()
    }

    pub fn stop(self) {
        self.timer.stop();
    }
}

/// Profile section a poller last observed, per user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SeenProfile {
    user_id: String,
    section: String,
}

/// Publishes the profile's section only when it differs from what the
/// previous poll saw, so a manual switch survives until the profile itself
/// changes.
pub(crate) async fn poll_profile_once<R>(
    service: &TimetableService<R>,
    identity: &dyn IdentityProvider,
    selection: &SharedSelection,
    sequencer: &RequestSequencer,
    last_seen: &mut Option<SeenProfile>,
) where
    R: RecordStore + ?Sized,
{
    let identity = match identity.current_identity() {
        Ok(Some(identity)) => identity,
        Ok(None) => {
            *last_seen = None;
            return;
        }
        Err(error) => {
            warn!(%error, "identity lookup failed during profile poll");
            return;
        }
    };

    let ticket = sequencer.issue();
    let profile = match service.load_profile(&identity.user_id).await {
        Ok(Some(profile)) => profile,
        Ok(None) => return,
        Err(error) => {
            warn!(%error, "profile poll failed");
            return;
        }
    };

    let unchanged = last_seen.as_ref().is_some_and(|seen| {
        seen.user_id == identity.user_id && seen.section.eq_ignore_ascii_case(&profile.section)
    });
    if unchanged {
        return;
    }
    sequencer.apply_if_current(ticket, profile.section, |section| {
        if let Err(error) = selection.publish(&section) {
            warn!(%error, %section, "profile names an unusable section");
        }
        *last_seen = Some(SeenProfile {
            user_id: identity.user_id,
            section,
        });
    });
}

/// Reloads the shown grid whenever the shared selection changes, so a section
/// picked in one view is drawn in all of them.
pub struct SectionFollower {
    timer: TimerHandle,
}

impl SectionFollower {
    pub fn spawn<R>(
        service: Arc<TimetableService<R>>,
        identity: Arc<dyn IdentityProvider>,
        selection: SharedSelection,
        sequencer: RequestSequencer,
        grid: Arc<watch::Sender<WeekSchedule>>,
    ) -> Self
    where
        R: RecordStore + ?Sized + 'static,
    {
        let mut selected = selection.subscribe();
        let task = tokio::spawn(async move {
            while selected.changed().await.is_ok() {
                let section_name = selected.borrow_and_update().clone();
                let owner = match identity.current_identity() {
                    Ok(identity) => identity.map(|identity| identity.user_id),
                    Err(error) => {
                        warn!(%error, "identity lookup failed while following selection");
                        None
                    }
                };

                let ticket = sequencer.issue();
                match service.load_section(owner.as_deref(), &section_name).await {
                    Ok(loaded) => {
                        sequencer.apply_if_current(ticket, loaded.value.schedule, |schedule| {
                            grid.send_replace(schedule);
                        });
                    }
                    Err(error) => warn!(%error, section = %section_name, "section reload failed"),
                }
            }
        });
        Self {
            timer: TimerHandle::new("section-follower", task),
        }
    }

    pub fn stop(self) {
        self.timer.stop();
    }
}

/// Coalesces grid edits and writes only the last snapshot once no edit has
/// arrived for the debounce window.
pub struct DebouncedSaver {
    sender: Option<mpsc::UnboundedSender<Section>>,
    saves: watch::Receiver<usize>,
    task: Option<JoinHandle<()>>,
}

impl DebouncedSaver {
    pub fn spawn<R>(service: Arc<TimetableService<R>>, owner: String, debounce: Duration) -> Self
    where
        R: RecordStore + ?Sized + 'static,
    {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Section>();
        let (saves_sender, saves) = watch::channel(0usize);

        let task = tokio::spawn(async move {
            let mut pending: Option<Section> = None;
            loop {
                let next = if pending.is_some() {
                    tokio::select! {
                        message = receiver.recv() => message,
                        _ = sleep(debounce) => {
                            if let Some(section) = pending.take() {
                                persist(&service, &owner, &section, &saves_sender).await;
                            }
                            continue;
                        }
                    }
                } else {
                    receiver.recv().await
                };

                match next {
                    Some(section) => pending = Some(section),
                    None => {
                        if let Some(section) = pending.take() {
                            persist(&service, &owner, &section, &saves_sender).await;
                        }
                        break;
                    }
                }
            }
        });

        Self {
            sender: Some(sender),
            saves,
            task: Some(task),
        }
    }

    pub fn submit(&self, section: Section) -> Result<(), InfraError> {
        self.sender
            .as_ref()
            .ok_or_else(|| InfraError::Store("debounced saver is closed".to_string()))?
            .send(section)
            .map_err(|_| InfraError::Store("debounced saver is not running".to_string()))
    }

    /// Number of completed writes.
    pub fn subscribe_saves(&self) -> watch::Receiver<usize> {
        self.saves.clone()
    }

    /// Writes any pending edit now and waits for the task to finish.
    pub async fn flush(mut self) {
        self.sender.take();
        if let Some(task) = self.task.take() {
            if let Err(error) = task.await {
                warn!(%error, "debounced saver ended abnormally");
            }
        }
    }
}

impl Drop for DebouncedSaver {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn persist<R>(
    service: &TimetableService<R>,
    owner: &str,
    section: &Section,
    saves: &watch::Sender<usize>,
) where
    R: RecordStore + ?Sized,
{
    match service.save_section(owner, section).await {
        Ok(_) => {
            saves.send_modify(|count| *count += 1);
        }
        Err(error) => warn!(%error, section = %section.name, "debounced save failed"),
    }
}
