//! Shared fixtures for unit tests.

use crate::data::{Period, ScheduleParameters, TimetableData};
use crate::extract::extract;
use crate::store::tests::{slot, subject};
use crate::store::{Records, TutorRecord};

pub fn period() -> Period {
    Period {
        year: 2024,
        study_period: "S1".into(),
        timetable: 1,
    }
}

/// Two students, two single-section subjects, two tutors each free in one
/// slot on different days. Jo takes both subjects, Sam takes ECON1.
pub fn scenario() -> (Records, Period) {
    let records = Records {
        students: vec![],
        subjects: vec![
            subject("ECON1", Some("Ann"), &["Jo", "Sam"]),
            subject("ECON2", Some("Bob"), &["Jo"]),
        ],
        tutors: vec![
            TutorRecord {
                name: "Ann".into(),
                available: vec![1],
            },
            TutorRecord {
                name: "Bob".into(),
                available: vec![2],
            },
        ],
        timeslots: vec![slot(1, "Monday", "10:00"), slot(2, "Tuesday", "21:30")],
    };
    (records, period())
}

pub fn scenario_data() -> TimetableData {
    let (records, period) = scenario();
    extract(&records, &period, ScheduleParameters::default())
}

/// A busier week: three tutors, five subjects, eight students and six slots
/// over three days, with room for clashes and late sections.
pub fn busy_week() -> (Records, Period) {
    let students = ["Ari", "Bea", "Cal", "Dee", "Eli", "Fay", "Gus", "Hal"];
    let records = Records {
        students: vec![],
        subjects: vec![
            subject("ACCT1", Some("Ann"), &students[..5]),
            subject("ECON1", Some("Ann"), &students[3..]),
            {
                let mut s = subject("FNCE1", Some("Bob"), &students);
                s.repeats = 2;
                s
            },
            subject("MAST1", Some("Cat"), &["Ari", "Cal", "Eli", "Gus"]),
            subject("MAST2", Some("Cat"), &["Bea", "Dee"]),
        ],
        tutors: vec![
            TutorRecord {
                name: "Ann".into(),
                available: vec![1, 2, 3, 4, 5, 6],
            },
            TutorRecord {
                name: "Bob".into(),
                available: vec![1, 3, 5, 6],
            },
            TutorRecord {
                name: "Cat".into(),
                available: vec![2, 4, 6],
            },
        ],
        timeslots: vec![
            slot(1, "Monday", "10:00"),
            slot(2, "Monday", "21:30"),
            slot(3, "Wednesday", "10:00"),
            slot(4, "Wednesday", "14:00"),
            slot(5, "Friday", "10:00"),
            slot(6, "Friday", "21:30"),
        ],
    };
    (records, period())
}
