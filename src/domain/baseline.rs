use crate::domain::models::{
    Course, CourseType, DaySchedule, Room, RoomKind, ScheduleEntry, Section, SlotCell, SlotId,
    WeekSchedule,
};
use crate::domain::time_window::ClassCalendar;

pub const DEFAULT_SLOTS: [&str; 7] = [
    "09:30-10:20",
    "10:20-11:10",
    "11:10-12:00",
    "12:00-12:50",
    "LUNCH",
    "13:40-14:30",
    "14:30-15:20",
];

pub const SECTION_NAMES: [&str; 3] = ["CSE A", "CSE B", "CSE C"];

struct CourseSeed {
    code: &'static str,
    title: &'static str,
    instructor: &'static str,
    credits: f32,
    course_type: CourseType,
}

const fn theory(
    code: &'static str,
    title: &'static str,
    instructor: &'static str,
    credits: f32,
) -> CourseSeed {
    CourseSeed {
        code,
        title,
        instructor,
        credits,
        course_type: CourseType::Theory,
    }
}

const fn lab(
    code: &'static str,
    title: &'static str,
    instructor: &'static str,
    credits: f32,
) -> CourseSeed {
    CourseSeed {
        code,
        title,
        instructor,
        credits,
        course_type: CourseType::Lab,
    }
}

const COURSES: [CourseSeed; 10] = [
    theory("CSE-3101", "Database Management Systems", "Dr. Farhana Akter", 3.0),
    lab(
        "CSE-3102",
        "Database Management Systems Lab",
        "Dr. Farhana Akter+Tanvir Hasan",
        1.5,
    ),
    theory("CSE-3103", "Computer Networks", "Md. Rakibul Islam", 3.0),
    lab("CSE-3104", "Computer Networks Lab", "Md. Rakibul Islam", 1.5),
    theory("CSE-3105", "Theory of Computation", "Prof. Abdul Karim", 3.0),
    theory("CSE-3107", "Software Engineering", "Nusrat Jahan", 3.0),
    lab("CSE-3108", "Software Engineering Lab", "Nusrat Jahan+Sadia Rahman", 0.75),
    theory("MAT-3101", "Numerical Methods", "Dr. Kamal Uddin", 3.0),
    theory("HUM-3101", "Engineering Economics", "Shirin Sultana", 2.0),
    theory("ESC-3101", "Environmental Studies", "Mahmudul Hasan", 2.0),
];

/// Course codes per weekday, one column per entry of `DEFAULT_SLOTS`.
/// An empty code is a free period; the `LUNCH` column is always empty.
const WEEK_PATTERN: [[&str; 7]; 5] = [
    ["CSE-3101", "CSE-3103", "MAT-3101", "", "", "CSE-3102", "CSE-3102"],
    ["CSE-3105", "CSE-3107", "", "HUM-3101", "", "", ""],
    ["CSE-3103", "CSE-3101", "ESC-3101", "", "", "CSE-3104", "CSE-3104"],
    ["", "CSE-3105", "MAT-3101", "CSE-3107", "", "", ""],
    ["HUM-3101", "ESC-3101", "", "", "", "CSE-3108", "CSE-3108"],
];

pub fn baseline_courses() -> Vec<Course> {
    COURSES
        .iter()
        .map(|seed| Course {
            id: None,
            code: seed.code.to_string(),
            title: seed.title.to_string(),
            instructor: seed.instructor.to_string(),
            credits: seed.credits,
            course_type: seed.course_type,
        })
        .collect()
}

pub fn baseline_rooms() -> Vec<Room> {
    let room = |name: &str, building: &str, floor: i32, capacity: u32, kind: RoomKind| Room {
        id: None,
        name: name.to_string(),
        building: building.to_string(),
        floor: Some(floor),
        capacity,
        kind,
    };
    vec![
        room("AB-301", "Academic Building 1", 3, 60, RoomKind::Classroom),
        room("AB-302", "Academic Building 1", 3, 60, RoomKind::Classroom),
        room("AB-303", "Academic Building 1", 3, 60, RoomKind::Classroom),
        room("CL-401", "Academic Building 1", 4, 40, RoomKind::Lab),
        room("NL-402", "Academic Building 1", 4, 40, RoomKind::Lab),
        room("SR-501", "Academic Building 2", 5, 120, RoomKind::Seminar),
        room("FO-205", "Academic Building 2", 2, 6, RoomKind::Office),
    ]
}

pub fn baseline_sections() -> Vec<Section> {
    let rooms = ["AB-301", "AB-302", "AB-303"];
    SECTION_NAMES
        .iter()
        .zip(rooms)
        .enumerate()
        .map(|(rotation, (name, room))| Section {
            name: (*name).to_string(),
            room: room.to_string(),
            schedule: section_grid(rotation),
        })
        .collect()
}

pub fn baseline_section(name: &str) -> Option<Section> {
    baseline_sections()
        .into_iter()
        .find(|section| section.name.eq_ignore_ascii_case(name.trim()))
}

// Each section sees the same weekly pattern shifted by `rotation` days.
fn section_grid(rotation: usize) -> WeekSchedule {
    let courses = baseline_courses();
    let entry = |code: &str| {
        courses
            .iter()
            .find(|course| !code.is_empty() && course.code == code)
            .map(|course| ScheduleEntry::new(&course.code, &course.title, &course.instructor))
    };

    let days = ClassCalendar::default()
        .class_days
        .into_iter()
        .enumerate()
        .map(|(index, day)| {
            let codes = WEEK_PATTERN[(index + rotation) % WEEK_PATTERN.len()];
            DaySchedule {
                day,
                cells: DEFAULT_SLOTS
                    .iter()
                    .zip(codes)
                    .map(|(slot, code)| SlotCell {
                        slot: SlotId::new(*slot),
                        entry: entry(code),
                    })
                    .collect(),
            }
        })
        .collect();
    WeekSchedule { days }
}

pub fn is_known_section(name: &str) -> bool {
    SECTION_NAMES
        .iter()
        .any(|candidate| candidate.eq_ignore_ascii_case(name.trim()))
}

pub fn default_section_name() -> &'static str {
    SECTION_NAMES[0]
}
