//! Error types for the timetabler.
//!
//! Infeasible or otherwise non-optimal solves are not errors; they are
//! reported as a [`SolveStatus`](crate::data::SolveStatus).

use thiserror::Error;

use crate::data::{SubjectCode, TimeslotId, TimetableId, TutorName};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unknown subject: {0}")]
    UnknownSubject(SubjectCode),

    #[error("Unknown tutor: {0}")]
    UnknownTutor(TutorName),

    #[error("Unknown timeslot {timeslot} in timetable {timetable}")]
    UnknownTimeslot {
        timeslot: TimeslotId,
        timetable: TimetableId,
    },

    #[error("Unknown student: {0}")]
    UnknownStudent(String),

    #[error("Duplicate timeslot id: {0}")]
    DuplicateTimeslot(TimeslotId),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Background solve failed: {0}")]
    Worker(String),
}
