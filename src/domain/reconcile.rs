use crate::domain::error::ScheduleError;
use crate::domain::models::{Course, Room, RoomKind};
use std::collections::{HashMap, HashSet};

/// A record matched across baseline and override sets by a domain key.
pub trait NamedRecord {
    fn natural_key(&self) -> &str;

    /// Fields a free-text search looks at.
    fn search_fields(&self) -> Vec<&str>;
}

impl NamedRecord for Course {
    fn natural_key(&self) -> &str {
        &self.code
    }

    fn search_fields(&self) -> Vec<&str> {
        vec![self.code.as_str(), self.title.as_str(), self.instructor.as_str()]
    }
}

impl NamedRecord for Room {
    fn natural_key(&self) -> &str {
        &self.name
    }

    fn search_fields(&self) -> Vec<&str> {
        let kind = match self.kind {
            RoomKind::Classroom => "classroom",
            RoomKind::Lab => "lab",
            RoomKind::Seminar => "seminar",
            RoomKind::Office => "office",
        };
        vec![self.name.as_str(), self.building.as_str(), kind]
    }
}

pub fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}

pub fn validate_overrides<T: NamedRecord>(overrides: &[T]) -> Result<(), ScheduleError> {
    for (index, record) in overrides.iter().enumerate() {
        if record.natural_key().trim().is_empty() {
            return Err(ScheduleError::Validation(format!(
                "override #{index} has an empty natural key"
            )));
        }
    }
    Ok(())
}

/// Merges overrides into the baseline by case-insensitive natural key.
///
/// Baseline order is kept; an override sharing a key takes the baseline
/// record's position. Overrides with no baseline counterpart follow in their
/// original relative order. When several overrides share a key the last one
/// wins and is emitted once, at the position of the first.
pub fn reconcile<T>(baseline: &[T], overrides: &[T]) -> Result<Vec<T>, ScheduleError>
where
    T: NamedRecord + Clone,
{
    validate_overrides(overrides)?;

    let mut lookup: HashMap<String, &T> = HashMap::with_capacity(overrides.len());
    for record in overrides {
        lookup.insert(normalize_key(record.natural_key()), record);
    }

    let mut consumed: HashSet<String> = HashSet::with_capacity(lookup.len());
    let mut merged = Vec::with_capacity(baseline.len() + lookup.len());
    for record in baseline {
        let key = normalize_key(record.natural_key());
        match lookup.get(&key) {
            Some(replacement) => {
                merged.push((*replacement).clone());
                consumed.insert(key);
            }
            None => merged.push(record.clone()),
        }
    }

    for record in overrides {
        let key = normalize_key(record.natural_key());
        if consumed.insert(key.clone()) {
            if let Some(winner) = lookup.get(&key) {
                merged.push((*winner).clone());
            }
        }
    }

    Ok(merged)
}

/// Case-insensitive substring filter, order preserving. A blank query keeps
/// everything.
pub fn filter_records<T>(records: &[T], query: &str) -> Vec<T>
where
    T: NamedRecord + Clone,
{
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return records.to_vec();
    }
    records
        .iter()
        .filter(|record| {
            record
                .search_fields()
                .iter()
                .any(|field| field.to_lowercase().contains(&needle))
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::CourseType;
    use proptest::prelude::*;

    fn course(code: &str, instructor: &str) -> Course {
        Course {
            id: None,
            code: code.to_string(),
            title: format!("Title of {code}"),
            instructor: instructor.to_string(),
            credits: 3.0,
            course_type: CourseType::Theory,
        }
    }

    fn override_course(id: &str, code: &str, instructor: &str) -> Course {
        Course {
            id: Some(id.to_string()),
            ..course(code, instructor)
        }
    }

    fn ten_courses() -> Vec<Course> {
        (1..=10)
            .map(|index| course(&format!("CSE-{index:03}"), "Baseline Lecturer"))
            .collect()
    }

    #[test]
    fn single_override_replaces_matching_course_in_place() {
        let baseline = ten_courses();
        let overrides = vec![override_course("rec-1", "CSE-005", "New Lecturer")];

        let merged = reconcile(&baseline, &overrides).expect("reconcile");

        assert_eq!(merged.len(), 10);
        assert_eq!(merged[4].instructor, "New Lecturer");
        assert_eq!(merged[4].id.as_deref(), Some("rec-1"));
        for (index, record) in merged.iter().enumerate() {
            if index != 4 {
                assert_eq!(record, &baseline[index]);
            }
        }
    }

    #[test]
    fn matching_is_case_insensitive() {
        let baseline = vec![course("ESC-501", "A")];
        let mut replacement = override_course("rec-1", "esc-501", "A");
        replacement.title = "X".to_string();

        let merged = reconcile(&baseline, &[replacement]).expect("reconcile");

        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].title, "X");
    }

    #[test]
    fn empty_sides_are_identities() {
        let baseline = ten_courses();
        let overrides = vec![override_course("rec-1", "MAT-101", "B")];

        assert_eq!(reconcile(&baseline, &[]).expect("reconcile"), baseline);
        assert_eq!(reconcile(&[], &overrides).expect("reconcile"), overrides);
    }

    #[test]
    fn unmatched_overrides_are_appended_in_order() {
        let baseline = vec![course("CSE-001", "A"), course("CSE-002", "A")];
        let overrides = vec![
            override_course("rec-2", "PHY-101", "B"),
            override_course("rec-1", "cse-002", "C"),
            override_course("rec-3", "CHE-101", "D"),
        ];

        let merged = reconcile(&baseline, &overrides).expect("reconcile");
        let codes = merged.iter().map(|record| record.code.as_str()).collect::<Vec<_>>();

        assert_eq!(codes, vec!["CSE-001", "cse-002", "PHY-101", "CHE-101"]);
    }

    #[test]
    fn duplicate_override_keys_resolve_to_last() {
        let baseline = vec![course("CSE-001", "A")];
        let overrides = vec![
            override_course("rec-1", "CSE-001", "First"),
            override_course("rec-2", "cse-001", "Second"),
            override_course("rec-3", "MAT-101", "Early"),
            override_course("rec-4", "MAT-101", "Late"),
        ];

        let merged = reconcile(&baseline, &overrides).expect("reconcile");

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].instructor, "Second");
        assert_eq!(merged[1].instructor, "Late");
    }

    #[test]
    fn empty_override_key_is_rejected() {
        let baseline = ten_courses();
        let overrides = vec![override_course("rec-1", "   ", "A")];
        assert!(matches!(
            reconcile(&baseline, &overrides),
            Err(ScheduleError::Validation(_))
        ));
    }

    #[test]
    fn filter_matches_any_search_field() {
        let courses = vec![
            course("CSE-301", "Rahim Uddin"),
            course("MAT-201", "Karim Ahmed"),
            course("CSE-305", "Karim Ahmed"),
        ];

        let by_code = filter_records(&courses, "cse");
        let by_instructor = filter_records(&courses, "KARIM");
        let everything = filter_records(&courses, "  ");

        assert_eq!(by_code.len(), 2);
        assert_eq!(by_instructor[0].code, "MAT-201");
        assert_eq!(by_instructor[1].code, "CSE-305");
        assert_eq!(everything, courses);
    }

    fn code_set(prefix: &'static str, max: usize) -> impl Strategy<Value = Vec<String>> {
        proptest::collection::btree_set(0u16..500u16, 0..max).prop_map(move |numbers| {
            numbers
                .into_iter()
                .map(|number| format!("{prefix}-{number:03}"))
                .collect()
        })
    }

    proptest! {
        #[test]
        fn disjoint_keys_concatenate(base_codes in code_set("CSE", 12), override_codes in code_set("MAT", 12)) {
            let baseline = base_codes.iter().map(|code| course(code, "A")).collect::<Vec<_>>();
            let overrides = override_codes
                .iter()
                .enumerate()
                .map(|(index, code)| override_course(&format!("rec-{index}"), code, "B"))
                .collect::<Vec<_>>();

            let merged = reconcile(&baseline, &overrides).expect("reconcile");

            let expected = baseline.iter().chain(overrides.iter()).cloned().collect::<Vec<_>>();
            prop_assert_eq!(merged, expected);
        }

        #[test]
        fn covered_keys_keep_baseline_length_and_order(
            base_codes in code_set("CSE", 16),
            picks in proptest::collection::vec(any::<prop::sample::Index>(), 0..8)
        ) {
            let baseline = base_codes.iter().map(|code| course(code, "A")).collect::<Vec<_>>();
            let mut overrides: Vec<Course> = Vec::new();
            if !baseline.is_empty() {
                for pick in picks {
                    let target = &baseline[pick.index(baseline.len())];
                    if overrides.iter().any(|existing| existing.code == target.code.to_lowercase()) {
                        continue;
                    }
                    overrides.push(override_course(
                        &format!("rec-{}", overrides.len()),
                        &target.code.to_lowercase(),
                        "Override",
                    ));
                }
            }

            let merged = reconcile(&baseline, &overrides).expect("reconcile");

            prop_assert_eq!(merged.len(), baseline.len());
            for (index, record) in merged.iter().enumerate() {
                prop_assert_eq!(normalize_key(&record.code), normalize_key(&baseline[index].code));
                let replacement = overrides
                    .iter()
                    .find(|candidate| normalize_key(&candidate.code) == normalize_key(&baseline[index].code));
                match replacement {
                    Some(replacement) => prop_assert_eq!(record, replacement),
                    None => prop_assert_eq!(record, &baseline[index]),
                }
            }
        }
    }
}
