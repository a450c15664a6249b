use crate::domain::baseline::{
    baseline_courses, baseline_rooms, baseline_section, default_section_name, is_known_section,
};
use crate::domain::models::{Course, Room, Section, UserProfile};
use crate::domain::reconcile::{reconcile, NamedRecord};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::record_mapper::{
    decode_course, decode_profile, decode_room, decode_timetable, encode_course, encode_profile,
    encode_room, encode_timetable, TimetableOverride,
};
use crate::infrastructure::record_store::{EntityKind, RecordStore, StoredRecord};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::time::{sleep, Duration as TokioDuration};
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u8,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
        }
    }
}

/// A value read through the store. `degraded` is set when the store failed
/// and the value came from the last good read or the baseline.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Loaded<T> {
    pub value: T,
    pub degraded: bool,
}

impl<T> Loaded<T> {
    fn fresh(value: T) -> Self {
        Self {
            value,
            degraded: false,
        }
    }
}

type Decoder<T> = fn(&StoredRecord) -> Result<T, InfraError>;

pub struct TimetableService<R>
where
    R: RecordStore + ?Sized,
{
    store: Arc<R>,
    retry_policy: RetryPolicy,
    last_known_good: Mutex<HashMap<(EntityKind, String), Vec<StoredRecord>>>,
}

impl<R> TimetableService<R>
where
    R: RecordStore + ?Sized,
{
    pub fn new(store: Arc<R>) -> Self {
        Self {
            store,
            retry_policy: RetryPolicy::default(),
            last_known_good: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub async fn effective_courses(&self, owner: Option<&str>) -> Result<Loaded<Vec<Course>>, InfraError> {
        self.effective(EntityKind::Course, owner, baseline_courses(), decode_course)
            .await
    }

    pub async fn effective_rooms(&self, owner: Option<&str>) -> Result<Loaded<Vec<Room>>, InfraError> {
        self.effective(EntityKind::Room, owner, baseline_rooms(), decode_room)
            .await
    }

    pub async fn create_course_override(&self, owner: &str, course: &Course) -> Result<Course, InfraError> {
        let owner = require_owner(owner)?;
        course.validate()?;
        let record = self
            .store
            .create(EntityKind::Course, owner, encode_course(course))
            .await?;
        info!(owner, code = %course.code, "course override created");
        decode_course(&record)
    }

    pub async fn update_course_override(
        &self,
        owner: &str,
        id: &str,
        course: &Course,
    ) -> Result<Course, InfraError> {
        let owner = require_owner(owner)?;
        let id = require_id(id)?;
        course.validate()?;
        let record = self
            .store
            .update(EntityKind::Course, owner, id, encode_course(course))
            .await?;
        decode_course(&record)
    }

    pub async fn delete_course_override(&self, owner: &str, id: &str) -> Result<(), InfraError> {
        let owner = require_owner(owner)?;
        let id = require_id(id)?;
        self.store.delete(EntityKind::Course, owner, id).await
    }

    pub async fn create_room_override(&self, owner: &str, room: &Room) -> Result<Room, InfraError> {
        let owner = require_owner(owner)?;
        room.validate()?;
        let record = self
            .store
            .create(EntityKind::Room, owner, encode_room(room))
            .await?;
        info!(owner, name = %room.name, "room override created");
        decode_room(&record)
    }

    pub async fn update_room_override(&self, owner: &str, id: &str, room: &Room) -> Result<Room, InfraError> {
        let owner = require_owner(owner)?;
        let id = require_id(id)?;
        room.validate()?;
        let record = self
            .store
            .update(EntityKind::Room, owner, id, encode_room(room))
            .await?;
        decode_room(&record)
    }

    pub async fn delete_room_override(&self, owner: &str, id: &str) -> Result<(), InfraError> {
        let owner = require_owner(owner)?;
        let id = require_id(id)?;
        self.store.delete(EntityKind::Room, owner, id).await
    }

    /// The section grid a user sees: their saved grid if any, else the baseline.
    pub async fn load_section(&self, owner: Option<&str>, section_name: &str) -> Result<Loaded<Section>, InfraError> {
        let mut section = known_section(section_name)?;
        let Some(owner) = owner else {
            return Ok(Loaded::fresh(section));
        };

        let owner = require_owner(owner)?;
        let loaded = self.list_or_last_known(EntityKind::Timetable, owner).await?;
        let mut degraded = loaded.degraded;
        if let Some(saved) = find_timetable(&loaded.value, &section.name) {
            match saved.schedule.validate_against(&section.schedule) {
                Ok(()) => section.schedule = saved.schedule,
                Err(error) => {
                    warn!(owner, section = %section.name, %error, "saved grid does not fit the section, using baseline");
                    degraded = true;
                }
            }
        }
        Ok(Loaded {
            value: section,
            degraded,
        })
    }

    pub async fn save_section(&self, owner: &str, section: &Section) -> Result<TimetableOverride, InfraError> {
        let owner = require_owner(owner)?;
        let canonical = known_section(&section.name)?;
        section.schedule.validate_against(&canonical.schedule)?;
        let fields = encode_timetable(&canonical.name, &section.schedule)?;

        let existing = self.list_with_retry(EntityKind::Timetable, owner).await?;
        let record = match find_timetable(&existing, &canonical.name) {
            Some(saved) => {
                self.store
                    .update(EntityKind::Timetable, owner, &saved.id, fields)
                    .await?
            }
            None => self.store.create(EntityKind::Timetable, owner, fields).await?,
        };
        info!(owner, section = %canonical.name, "timetable saved");
        decode_timetable(&record)
    }

    pub async fn reset_section(&self, owner: &str, section_name: &str) -> Result<Section, InfraError> {
        let owner = require_owner(owner)?;
        let section = known_section(section_name)?;

        let existing = self.list_with_retry(EntityKind::Timetable, owner).await?;
        for record in &existing {
            let matches = decode_timetable(record)
                .map(|saved| saved.section.eq_ignore_ascii_case(&section.name))
                .unwrap_or(false);
            if matches {
                self.store
                    .delete(EntityKind::Timetable, owner, &record.id)
                    .await?;
            }
        }
        info!(owner, section = %section.name, "timetable reset to baseline");
        Ok(section)
    }

    /// `None` is the normal state of a user who has not onboarded yet.
    pub async fn load_profile(&self, owner: &str) -> Result<Option<UserProfile>, InfraError> {
        let owner = require_owner(owner)?;
        match self.store.load(EntityKind::Profile, owner).await {
            Ok(Some(record)) => decode_profile(&record, default_section_name()).map(Some),
            Ok(None) => Ok(None),
            Err(error) if error.is_not_found() => Ok(None),
            Err(error) => Err(error),
        }
    }

    pub async fn onboard(&self, owner: &str, profile: UserProfile) -> Result<UserProfile, InfraError> {
        let profile = prepare_profile(owner, profile)?;
        if self.load_profile(&profile.user_id).await?.is_some() {
            return Err(InfraError::Validation(
                "a profile already exists for this account".to_string(),
            ));
        }

        let record = self
            .store
            .create(EntityKind::Profile, &profile.user_id, encode_profile(&profile))
            .await?;
        info!(owner = %profile.user_id, section = %profile.section, "profile onboarded");
        decode_profile(&record, default_section_name())
    }

    pub async fn update_profile(&self, owner: &str, profile: UserProfile) -> Result<UserProfile, InfraError> {
        let profile = prepare_profile(owner, profile)?;
        let existing = self
            .load_profile(&profile.user_id)
            .await?
            .ok_or_else(|| InfraError::NotFound(format!("profile for {}", profile.user_id)))?;
        let id = existing
            .id
            .ok_or_else(|| InfraError::NotFound(format!("profile record for {}", profile.user_id)))?;

        let record = self
            .store
            .update(EntityKind::Profile, &profile.user_id, &id, encode_profile(&profile))
            .await?;
        decode_profile(&record, default_section_name())
    }

    /// Removes every record the owner has. Returns how many were deleted.
    pub async fn delete_account(&self, owner: &str) -> Result<usize, InfraError> {
        let owner = require_owner(owner)?;
        let mut deleted = 0;
        for kind in [
            EntityKind::Profile,
            EntityKind::Timetable,
            EntityKind::Course,
            EntityKind::Room,
        ] {
            for record in self.list_with_retry(kind, owner).await? {
                self.store.delete(kind, owner, &record.id).await?;
                deleted += 1;
            }
        }

        if let Ok(mut cache) = self.last_known_good.lock() {
            cache.retain(|(_, cached_owner), _| cached_owner != owner);
        }
        info!(owner, deleted, "account data deleted");
        Ok(deleted)
    }

    async fn effective<T>(
        &self,
        kind: EntityKind,
        owner: Option<&str>,
        baseline: Vec<T>,
        decode: Decoder<T>,
    ) -> Result<Loaded<Vec<T>>, InfraError>
    where
        T: NamedRecord + Clone,
    {
        let Some(owner) = owner else {
            return Ok(Loaded::fresh(baseline));
        };

        let loaded = self.list_or_last_known(kind, require_owner(owner)?).await?;
        let overrides = decode_all(&loaded.value, decode);
        match reconcile(&baseline, &overrides) {
            Ok(merged) => Ok(Loaded {
                value: merged,
                degraded: loaded.degraded,
            }),
            Err(error) => {
                warn!(kind = kind.as_str(), %error, "overrides rejected, showing baseline");
                Ok(Loaded {
                    value: baseline,
                    degraded: true,
                })
            }
        }
    }

    async fn list_or_last_known(
        &self,
        kind: EntityKind,
        owner: &str,
    ) -> Result<Loaded<Vec<StoredRecord>>, InfraError> {
        let key = (kind, owner.to_string());
        match self.list_with_retry(kind, owner).await {
            Ok(records) => {
                self.lock_cache()?.insert(key, records.clone());
                Ok(Loaded::fresh(records))
            }
            Err(error) if error.is_store_failure() => {
                warn!(kind = kind.as_str(), owner, %error, "store read failed, using last known records");
                let cached = self.lock_cache()?.get(&key).cloned().unwrap_or_default();
                Ok(Loaded {
                    value: cached,
                    degraded: true,
                })
            }
            Err(error) => Err(error),
        }
    }

    async fn list_with_retry(&self, kind: EntityKind, owner: &str) -> Result<Vec<StoredRecord>, InfraError> {
        let max_attempts = self.retry_policy.max_attempts.max(1);
        let mut attempt: u8 = 0;

        loop {
            match self.store.list(kind, owner).await {
                Ok(records) => return Ok(records),
                Err(error) if should_retry(&error) && attempt + 1 < max_attempts => {
                    let delay = self
                        .retry_policy
                        .base_delay_ms
                        .saturating_mul(2u64.saturating_pow(attempt as u32));
                    sleep(TokioDuration::from_millis(delay)).await;
                    attempt = attempt.saturating_add(1);
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn lock_cache(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<(EntityKind, String), Vec<StoredRecord>>>, InfraError> {
        self.last_known_good
            .lock()
            .map_err(|error| InfraError::Store(format!("record cache lock poisoned: {error}")))
    }
}

fn should_retry(error: &InfraError) -> bool {
    match error {
        InfraError::Store(message) => {
            let message = message.to_ascii_lowercase();
            message.contains("network error")
                || message.contains("timed out")
                || message.contains("http 502")
                || message.contains("http 503")
                || message.contains("http 504")
        }
        _ => false,
    }
}

fn decode_all<T>(records: &[StoredRecord], decode: Decoder<T>) -> Vec<T> {
    records
        .iter()
        .filter_map(|record| match decode(record) {
            Ok(value) => Some(value),
            Err(error) => {
                warn!(id = %record.id, kind = record.kind.as_str(), %error, "skipping undecodable record");
                None
            }
        })
        .collect()
}

fn find_timetable(records: &[StoredRecord], section_name: &str) -> Option<TimetableOverride> {
    decode_all(records, decode_timetable)
        .into_iter()
        .find(|saved| saved.section.eq_ignore_ascii_case(section_name))
}

fn known_section(section_name: &str) -> Result<Section, InfraError> {
    baseline_section(section_name)
        .ok_or_else(|| InfraError::Validation(format!("unknown section: {}", section_name.trim())))
}

fn require_owner(owner: &str) -> Result<&str, InfraError> {
    let owner = owner.trim();
    if owner.is_empty() {
        return Err(InfraError::Validation("owner key must not be empty".to_string()));
    }
    Ok(owner)
}

fn require_id(id: &str) -> Result<&str, InfraError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(InfraError::Validation("record id must not be empty".to_string()));
    }
    Ok(id)
}

fn prepare_profile(owner: &str, mut profile: UserProfile) -> Result<UserProfile, InfraError> {
    profile.user_id = require_owner(owner)?.to_string();
    profile.validate()?;
    if !is_known_section(&profile.section) {
        return Err(InfraError::Validation(format!(
            "unknown section: {}",
            profile.section.trim()
        )));
    }
    Ok(profile)
}
