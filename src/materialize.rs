//! Turns solved variable values into timetabled classes and persists them.

use itertools::Itertools;
use log::{debug, info};
use std::collections::BTreeSet;

use crate::data::{TimetableId, TimetabledClass};
use crate::error::Result;
use crate::solver::SolvedValues;
use crate::store::MemoryStore;

/// One class per running section, with the students assigned to it.
pub fn classes(values: &SolvedValues, timetable: TimetableId) -> Vec<TimetabledClass> {
    let mut rosters = values
        .assign
        .iter()
        .map(|(student, key)| (key, student.clone()))
        .into_group_map();

    values
        .runs
        .iter()
        .map(|key| {
            let students: BTreeSet<_> = rosters.remove(key).unwrap_or_default().into_iter().collect();
            debug!(
                "{} at slot {} with {}: {} students",
                key.subject,
                key.timeslot,
                key.tutor,
                students.len()
            );
            TimetabledClass {
                subject: key.subject.clone(),
                timeslot: key.timeslot,
                tutor: key.tutor.clone(),
                timetable,
                students,
            }
        })
        .collect()
}

/// Writes `classes` in one commit; nothing is written if any class is rejected.
pub fn commit(store: &MemoryStore, classes: Vec<TimetabledClass>) -> Result<usize> {
    if classes.is_empty() {
        return Ok(0);
    }
    let written = store.commit_classes(classes)?;
    info!("Committed {written} timetabled classes.");
    Ok(written)
}
