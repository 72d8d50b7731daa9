//! In-memory record store.
//!
//! Holds the enrolment, tutor and timeslot records the extractor reads, and
//! the timetabled classes the materializer writes back.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::data::{
    Day, SectionKey, StudentName, SubjectCode, TimeslotId, TimetableId, TimetabledClass, TutorName,
};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StudentRecord {
    pub id: u32,
    pub name: StudentName,
}

fn one() -> u32 {
    1
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectRecord {
    pub code: SubjectCode,
    #[serde(default)]
    pub name: String,
    pub year: i32,
    pub study_period: String,
    #[serde(default = "one")]
    pub repeats: u32,
    #[serde(default)]
    pub tutor: Option<TutorName>,
    #[serde(default)]
    pub students: Vec<StudentName>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TutorRecord {
    pub name: TutorName,
    #[serde(default)]
    pub available: Vec<TimeslotId>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeslotRecord {
    pub id: TimeslotId,
    pub year: i32,
    pub study_period: String,
    pub timetable: TimetableId,
    pub day: Day,
    pub time: String,
}

/// A full snapshot of the records the engine consumes.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Records {
    #[serde(default)]
    pub students: Vec<StudentRecord>,
    #[serde(default)]
    pub subjects: Vec<SubjectRecord>,
    #[serde(default)]
    pub tutors: Vec<TutorRecord>,
    #[serde(default)]
    pub timeslots: Vec<TimeslotRecord>,
}

impl Records {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for slot in &self.timeslots {
            if !seen.insert(slot.id) {
                return Err(Error::DuplicateTimeslot(slot.id));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct StoreState {
    records: Records,
    classes: BTreeMap<(TimetableId, SectionKey), TimetabledClass>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Records) -> Result<Self> {
        let store = Self::new();
        store.load(records)?;
        Ok(store)
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces all input records. Committed classes are kept.
    pub fn load(&self, records: Records) -> Result<()> {
        records.validate()?;
        self.write().records = records;
        Ok(())
    }

    pub fn records(&self) -> Records {
        self.read().records.clone()
    }

    /// Writes a batch of classes as one unit.
    ///
    /// Every class is checked against the records before anything is
    /// written; a class whose (subject, timeslot, tutor, timetable) key
    /// already exists has its roster replaced.
    pub fn commit_classes(&self, classes: Vec<TimetabledClass>) -> Result<usize> {
        let mut state = self.write();
        {
            let records = &state.records;
            let subjects: HashSet<&str> = records.subjects.iter().map(|s| s.code.as_str()).collect();
            let tutors: HashSet<&str> = records
                .tutors
                .iter()
                .map(|t| t.name.as_str())
                .chain(records.subjects.iter().filter_map(|s| s.tutor.as_deref()))
                .collect();
            let students: HashSet<&str> = records
                .students
                .iter()
                .map(|s| s.name.as_str())
                .chain(records.subjects.iter().flat_map(|s| s.students.iter().map(String::as_str)))
                .collect();
            let slots: HashSet<(TimetableId, TimeslotId)> =
                records.timeslots.iter().map(|t| (t.timetable, t.id)).collect();

            for class in &classes {
                if !subjects.contains(class.subject.as_str()) {
                    return Err(Error::UnknownSubject(class.subject.clone()));
                }
                if !tutors.contains(class.tutor.as_str()) {
                    return Err(Error::UnknownTutor(class.tutor.clone()));
                }
                if !slots.contains(&(class.timetable, class.timeslot)) {
                    return Err(Error::UnknownTimeslot {
                        timeslot: class.timeslot,
                        timetable: class.timetable,
                    });
                }
                if let Some(student) = class.students.iter().find(|s| !students.contains(s.as_str())) {
                    return Err(Error::UnknownStudent(student.clone()));
                }
            }
        }

        let written = classes.len();
        for class in classes {
            state.classes.insert((class.timetable, class.key()), class);
        }
        Ok(written)
    }

    pub fn classes(&self, timetable: TimetableId) -> Vec<TimetabledClass> {
        self.read()
            .classes
            .range((timetable, SectionKey::min())..)
            .take_while(|((t, _), _)| *t == timetable)
            .map(|(_, class)| class.clone())
            .collect()
    }

    pub fn clear_classes(&self, timetable: TimetableId) -> usize {
        let mut state = self.write();
        let before = state.classes.len();
        state.classes.retain(|(t, _), _| *t != timetable);
        before - state.classes.len()
    }

    pub fn timeslots(&self, timetable: TimetableId) -> BTreeMap<TimeslotId, TimeslotRecord> {
        self.read()
            .records
            .timeslots
            .iter()
            .filter(|t| t.timetable == timetable)
            .map(|t| (t.id, t.clone()))
            .collect()
    }
}

impl SectionKey {
    fn min() -> Self {
        SectionKey {
            subject: String::new(),
            timeslot: 0,
            tutor: String::new(),
        }
    }
}
