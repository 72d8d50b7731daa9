//! Reshapes stored records into the flat collections the model is built from.

use itertools::Itertools;
use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::data::{
    Period, ScheduleParameters, SubjectSpec, TimeslotId, Timeslot, TimetableData, TutorSpec,
};
use crate::store::{Records, TimeslotRecord};

/// Extracts the data for `period` from a records snapshot.
///
/// Subjects without a tutor are left out. Students and tutors are keyed by
/// name, so duplicates collapse. A period with no records yields empty
/// collections rather than an error.
pub fn extract(records: &Records, period: &Period, params: ScheduleParameters) -> TimetableData {
    let in_period =
        |year: i32, study_period: &str| year == period.year && study_period == period.study_period;

    let timeslots: BTreeMap<TimeslotId, Timeslot> = records
        .timeslots
        .iter()
        .filter(|t| in_period(t.year, t.study_period.as_str()) && t.timetable == period.timetable)
        .map(|t| {
            (
                t.id,
                Timeslot {
                    id: t.id,
                    day: t.day.clone(),
                    time: t.time.clone(),
                },
            )
        })
        .collect();

    let days = timeslots
        .values()
        .map(|t| (t.day.clone(), t.id))
        .into_group_map()
        .into_iter()
        .map(|(day, ids)| (day, ids.into_iter().collect::<BTreeSet<_>>()))
        .collect();

    let mut subjects: BTreeMap<String, SubjectSpec> = BTreeMap::new();
    for record in records
        .subjects
        .iter()
        .filter(|s| in_period(s.year, s.study_period.as_str()))
    {
        let Some(tutor) = &record.tutor else {
            debug!("Skipping subject {} with no tutor", record.code);
            continue;
        };
        let spec = subjects.entry(record.code.clone()).or_insert_with(|| SubjectSpec {
            code: record.code.clone(),
            repeats: record.repeats,
            tutor: tutor.clone(),
            students: BTreeSet::new(),
        });
        if spec.tutor != *tutor {
            warn!(
                "Subject {} listed twice with tutors {} and {}; keeping {}",
                record.code, spec.tutor, tutor, spec.tutor
            );
        }
        spec.students.extend(record.students.iter().cloned());
    }

    let students = subjects
        .values()
        .flat_map(|s| s.students.iter().cloned())
        .collect();

    // availability is recorded per slot but matched on (day, time)
    let slot_by_id: HashMap<TimeslotId, &TimeslotRecord> =
        records.timeslots.iter().map(|t| (t.id, t)).collect();
    let current_by_label: HashMap<(&str, &str), Vec<TimeslotId>> = timeslots
        .values()
        .map(|t| ((t.day.as_str(), t.time.as_str()), t.id))
        .into_group_map();
    let mut availability: HashMap<&str, BTreeSet<TimeslotId>> = HashMap::new();
    for tutor in &records.tutors {
        let slots = tutor
            .available
            .iter()
            .filter_map(|id| slot_by_id.get(id))
            .filter_map(|t| current_by_label.get(&(t.day.as_str(), t.time.as_str())))
            .flatten()
            .copied();
        availability.entry(tutor.name.as_str()).or_default().extend(slots);
    }

    let mut tutors: BTreeMap<String, TutorSpec> = BTreeMap::new();
    for subject in subjects.values() {
        let tutor = tutors.entry(subject.tutor.clone()).or_insert_with(|| TutorSpec {
            name: subject.tutor.clone(),
            subjects: BTreeSet::new(),
            available: availability.get(subject.tutor.as_str()).cloned().unwrap_or_default(),
        });
        tutor.subjects.insert(subject.code.clone());
    }

    TimetableData {
        students,
        subjects,
        timeslots,
        days,
        tutors,
        params,
    }
}
