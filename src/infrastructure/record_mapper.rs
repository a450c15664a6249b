use crate::domain::models::{Course, CourseType, Room, RoomKind, UserProfile, WeekSchedule};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::record_store::StoredRecord;
use serde_json::{json, Map, Value};

const KEY_CODE: &str = "code";
const KEY_TITLE: &str = "title";
const KEY_INSTRUCTOR: &str = "instructor";
const KEY_CREDITS: &str = "credits";
const KEY_COURSE_TYPE: &str = "course_type";
const KEY_NAME: &str = "name";
const KEY_BUILDING: &str = "building";
const KEY_FLOOR: &str = "floor";
const KEY_CAPACITY: &str = "capacity";
const KEY_KIND: &str = "kind";
const KEY_FULL_NAME: &str = "full_name";
const KEY_EMAIL: &str = "email";
const KEY_PHONE: &str = "phone";
const KEY_DEPARTMENT: &str = "department";
const KEY_SECTION: &str = "section";
const KEY_ROLL_NUMBER: &str = "roll_number";
const KEY_REGISTRATION_NUMBER: &str = "registration_number";
const KEY_SEMESTER: &str = "semester";
const KEY_SCHEDULE: &str = "schedule";

/// A user's edited grid for one section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimetableOverride {
    pub id: String,
    pub section: String,
    pub schedule: WeekSchedule,
}

pub fn encode_course(course: &Course) -> Value {
    json!({
        KEY_CODE: course.code.trim(),
        KEY_TITLE: course.title.trim(),
        KEY_INSTRUCTOR: course.instructor.trim(),
        KEY_CREDITS: course.credits,
        KEY_COURSE_TYPE: course_type_to_string(course.course_type),
    })
}

pub fn decode_course(record: &StoredRecord) -> Result<Course, InfraError> {
    let fields = object_fields(record)?;
    let code = required_text(fields, KEY_CODE, record)?;
    let title = text(fields, KEY_TITLE).unwrap_or_else(|| code.clone());
    let course_type = text(fields, KEY_COURSE_TYPE)
        .as_deref()
        .map(parse_course_type)
        .transpose()?
        .unwrap_or(CourseType::Theory);

    Ok(Course {
        id: Some(record.id.clone()),
        code,
        title,
        instructor: text(fields, KEY_INSTRUCTOR).unwrap_or_default(),
        credits: fields
            .get(KEY_CREDITS)
            .and_then(Value::as_f64)
            .map(|value| value as f32)
            .unwrap_or(0.0),
        course_type,
    })
}

pub fn encode_room(room: &Room) -> Value {
    json!({
        KEY_NAME: room.name.trim(),
        KEY_BUILDING: room.building.trim(),
        KEY_FLOOR: room.floor,
        KEY_CAPACITY: room.capacity,
        KEY_KIND: room_kind_to_string(room.kind),
    })
}

pub fn decode_room(record: &StoredRecord) -> Result<Room, InfraError> {
    let fields = object_fields(record)?;
    let kind = text(fields, KEY_KIND)
        .as_deref()
        .map(parse_room_kind)
        .transpose()?
        .unwrap_or(RoomKind::Classroom);

    Ok(Room {
        id: Some(record.id.clone()),
        name: required_text(fields, KEY_NAME, record)?,
        building: text(fields, KEY_BUILDING).unwrap_or_default(),
        floor: fields
            .get(KEY_FLOOR)
            .and_then(Value::as_i64)
            .and_then(|value| i32::try_from(value).ok()),
        capacity: fields
            .get(KEY_CAPACITY)
            .and_then(Value::as_u64)
            .and_then(|value| u32::try_from(value).ok())
            .unwrap_or(0),
        kind,
    })
}

pub fn encode_profile(profile: &UserProfile) -> Value {
    json!({
        KEY_FULL_NAME: profile.full_name.trim(),
        KEY_EMAIL: profile.email.trim(),
        KEY_PHONE: profile.phone,
        KEY_DEPARTMENT: profile.department,
        KEY_SECTION: profile.section.trim(),
        KEY_ROLL_NUMBER: profile.roll_number,
        KEY_REGISTRATION_NUMBER: profile.registration_number,
        KEY_SEMESTER: profile.semester,
    })
}

pub fn decode_profile(record: &StoredRecord, default_section: &str) -> Result<UserProfile, InfraError> {
    let fields = object_fields(record)?;
    Ok(UserProfile {
        id: Some(record.id.clone()),
        user_id: record.owner_key.clone(),
        full_name: text(fields, KEY_FULL_NAME).unwrap_or_default(),
        email: text(fields, KEY_EMAIL).unwrap_or_default(),
        phone: text(fields, KEY_PHONE),
        department: text(fields, KEY_DEPARTMENT),
        section: text(fields, KEY_SECTION).unwrap_or_else(|| default_section.to_string()),
        roll_number: text(fields, KEY_ROLL_NUMBER),
        registration_number: text(fields, KEY_REGISTRATION_NUMBER),
        semester: fields
            .get(KEY_SEMESTER)
            .and_then(Value::as_u64)
            .and_then(|value| u8::try_from(value).ok()),
        updated_at: Some(record.updated_at),
    })
}

pub fn encode_timetable(section: &str, schedule: &WeekSchedule) -> Result<Value, InfraError> {
    Ok(json!({
        KEY_SECTION: section.trim(),
        KEY_SCHEDULE: serde_json::to_value(schedule)?,
    }))
}

pub fn decode_timetable(record: &StoredRecord) -> Result<TimetableOverride, InfraError> {
    let fields = object_fields(record)?;
    let section = required_text(fields, KEY_SECTION, record)?;
    let schedule_value = fields.get(KEY_SCHEDULE).cloned().ok_or_else(|| {
        InfraError::Validation(format!("timetable {} has no schedule", record.id))
    })?;
    let schedule: WeekSchedule = serde_json::from_value(schedule_value)?;
    Ok(TimetableOverride {
        id: record.id.clone(),
        section,
        schedule,
    })
}

fn object_fields(record: &StoredRecord) -> Result<&Map<String, Value>, InfraError> {
    record.fields.as_object().ok_or_else(|| {
        InfraError::Validation(format!(
            "{} {} fields must be an object",
            record.kind.as_str(),
            record.id
        ))
    })
}

fn text(fields: &Map<String, Value>, key: &str) -> Option<String> {
    fields
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
}

fn required_text(
    fields: &Map<String, Value>,
    key: &str,
    record: &StoredRecord,
) -> Result<String, InfraError> {
    text(fields, key).ok_or_else(|| {
        InfraError::Validation(format!(
            "{} {} is missing {key}",
            record.kind.as_str(),
            record.id
        ))
    })
}

fn parse_course_type(value: &str) -> Result<CourseType, InfraError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "theory" => Ok(CourseType::Theory),
        "lab" | "sessional" => Ok(CourseType::Lab),
        other => Err(InfraError::Validation(format!("invalid course_type value: {other}"))),
    }
}

fn parse_room_kind(value: &str) -> Result<RoomKind, InfraError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "classroom" => Ok(RoomKind::Classroom),
        "lab" => Ok(RoomKind::Lab),
        "seminar" => Ok(RoomKind::Seminar),
        "office" => Ok(RoomKind::Office),
        other => Err(InfraError::Validation(format!("invalid room kind value: {other}"))),
    }
}

fn course_type_to_string(value: CourseType) -> &'static str {
    match value {
        CourseType::Theory => "theory",
        CourseType::Lab => "lab",
    }
}

fn room_kind_to_string(value: RoomKind) -> &'static str {
    match value {
        RoomKind::Classroom => "classroom",
        RoomKind::Lab => "lab",
        RoomKind::Seminar => "seminar",
        RoomKind::Office => "office",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::baseline::baseline_section;
    use crate::infrastructure::record_store::EntityKind;
    use chrono::{DateTime, Utc};

    fn stored(kind: EntityKind, fields: Value) -> StoredRecord {
        let at = DateTime::parse_from_rfc3339("2026-10-16T08:00:00Z")
            .expect("valid datetime")
            .with_timezone(&Utc);
        StoredRecord {
            id: "rec-1".to_string(),
            kind,
            owner_key: "uid-1".to_string(),
            fields,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn decode_course_defaults_missing_optional_fields() {
        let course = decode_course(&stored(EntityKind::Course, json!({"code": " CSE-3101 "})))
            .expect("decode course");

        assert_eq!(course.id.as_deref(), Some("rec-1"));
        assert_eq!(course.code, "CSE-3101");
        assert_eq!(course.title, "CSE-3101");
        assert_eq!(course.instructor, "");
        assert_eq!(course.credits, 0.0);
        assert_eq!(course.course_type, CourseType::Theory);
    }

    #[test]
    fn decode_course_requires_code() {
        let result = decode_course(&stored(EntityKind::Course, json!({"title": "No code"})));
        assert!(matches!(result, Err(InfraError::Validation(_))));

        let result = decode_course(&stored(EntityKind::Course, json!(["not", "an", "object"])));
        assert!(matches!(result, Err(InfraError::Validation(_))));
    }

    #[test]
    fn encoded_course_decodes_to_the_same_content() {
        let course = Course {
            id: None,
            code: "CSE-3102".to_string(),
            title: "DBMS Lab".to_string(),
            instructor: "A+B".to_string(),
            credits: 1.5,
            course_type: CourseType::Lab,
        };
        let decoded = decode_course(&stored(EntityKind::Course, encode_course(&course)))
            .expect("decode course");
        assert_eq!(Course { id: None, ..decoded }, course);
    }

    #[test]
    fn decode_room_rejects_unknown_kind() {
        let result = decode_room(&stored(
            EntityKind::Room,
            json!({"name": "AB-301", "kind": "auditorium"}),
        ));
        assert!(matches!(result, Err(InfraError::Validation(_))));
    }

    #[test]
    fn decode_profile_uses_owner_and_default_section() {
        let profile = decode_profile(
            &stored(
                EntityKind::Profile,
                json!({"full_name": "Nusrat Jahan", "email": "n@example.edu", "semester": 5}),
            ),
            "CSE A",
        )
        .expect("decode profile");

        assert_eq!(profile.user_id, "uid-1");
        assert_eq!(profile.section, "CSE A");
        assert_eq!(profile.semester, Some(5));
        assert_eq!(profile.phone, None);
    }

    #[test]
    fn timetable_roundtrip_keeps_grid() {
        let section = baseline_section("CSE B").expect("baseline section");
        let fields = encode_timetable(&section.name, &section.schedule).expect("encode timetable");
        let decoded = decode_timetable(&stored(EntityKind::Timetable, fields)).expect("decode timetable");

        assert_eq!(decoded.section, "CSE B");
        assert_eq!(decoded.schedule, section.schedule);
    }
}
