//! Audits a materialised schedule: hard-invariant violations and the soft
//! objective terms recomputed from the classes themselves.

use itertools::Itertools;
use std::collections::{BTreeMap, BTreeSet};

use crate::data::{ScheduleScore, TimetableData, TimetabledClass, UnmetSoftConstraint};
use crate::model::ModelOptions;

/// Lists every hard invariant `classes` breaks. Empty means the schedule is sound.
pub fn violations(data: &TimetableData, classes: &[TimetabledClass]) -> Vec<String> {
    let params = data.params;
    let mut found = Vec::new();

    for class in classes {
        let Some(subject) = data.subjects.get(&class.subject) else {
            found.push(format!("Class for unknown subject {}", class.subject));
            continue;
        };
        let teaches = data
            .tutors
            .get(&class.tutor)
            .is_some_and(|t| t.subjects.contains(&class.subject));
        if !teaches {
            found.push(format!("{} does not teach {}", class.tutor, class.subject));
        }
        let available = data
            .tutors
            .get(&class.tutor)
            .is_some_and(|t| t.available.contains(&class.timeslot));
        if !available {
            found.push(format!(
                "{} is not available at slot {} for {}",
                class.tutor, class.timeslot, class.subject
            ));
        }
        let size = class.students.len() as u32;
        if size < params.min_class_size || size > params.max_class_size {
            found.push(format!(
                "{} at slot {} has {} students, outside [{}, {}]",
                class.subject, class.timeslot, size, params.min_class_size, params.max_class_size
            ));
        }
        for student in class.students.difference(&subject.students) {
            found.push(format!("{student} attends {} without being enrolled", class.subject));
        }
    }

    let by_subject = classes.iter().into_group_map_by(|c| c.subject.as_str());
    for subject in data.subjects.values() {
        let sections = by_subject.get(subject.code.as_str()).map(Vec::as_slice).unwrap_or_default();
        if sections.len() != subject.repeats as usize {
            found.push(format!(
                "{} runs {} sections, expected {}",
                subject.code,
                sections.len(),
                subject.repeats
            ));
        }
        for student in &subject.students {
            let attended = sections.iter().filter(|c| c.students.contains(student)).count();
            if attended != 1 {
                found.push(format!("{student} attends {attended} sections of {}", subject.code));
            }
        }
    }

    for ((tutor, slot), count) in classes.iter().map(|c| (c.tutor.as_str(), c.timeslot)).counts() {
        if count > 1 {
            found.push(format!("{tutor} teaches {count} sections at slot {slot}"));
        }
    }
    for (slot, count) in classes.iter().map(|c| c.timeslot).counts() {
        if count > params.max_concurrent_classes as usize {
            found.push(format!(
                "Slot {slot} hosts {count} sections, more than {}",
                params.max_concurrent_classes
            ));
        }
    }

    found
}

/// Recomputes the weighted objective and reports unmet soft constraints.
pub fn score(
    data: &TimetableData,
    classes: &[TimetabledClass],
    options: &ModelOptions,
) -> ScheduleScore {
    let mut unmet = Vec::new();

    // keep tutors on site as few days as possible
    let mut tutor_days = 0;
    let mut days_by_tutor: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for class in classes {
        if let Some(day) = data.day_of(class.timeslot) {
            days_by_tutor.entry(class.tutor.as_str()).or_default().insert(day);
        }
    }
    for (tutor, days) in &days_by_tutor {
        tutor_days += days.len() as u32;
        if days.len() > 1 {
            unmet.push(UnmetSoftConstraint {
                constraint_type: "Cluster Tutor Days".to_string(),
                description: format!(
                    "Tutor {} teaches on {} days: {}.",
                    tutor,
                    days.len(),
                    days.iter().join(", ")
                ),
            });
        }
    }

    // avoid students attending two sections at once
    let mut student_clashes = 0;
    let sections_by_student_slot = classes
        .iter()
        .flat_map(|c| c.students.iter().map(move |s| ((s.as_str(), c.timeslot), c.subject.as_str())))
        .into_group_map();
    for ((student, slot), subjects) in sections_by_student_slot.into_iter().sorted() {
        if subjects.len() > 1 {
            student_clashes += 1;
            unmet.push(UnmetSoftConstraint {
                constraint_type: "Avoid Student Clashes".to_string(),
                description: format!(
                    "Student {} has {} sections at slot {}: {}.",
                    student,
                    subjects.len(),
                    slot,
                    subjects.iter().join(", ")
                ),
            });
        }
    }

    // avoid late sections
    let mut late_sections = 0;
    for class in classes {
        let Some(slot) = data.timeslots.get(&class.timeslot) else {
            continue;
        };
        if options.is_late(slot) {
            late_sections += 1;
            unmet.push(UnmetSoftConstraint {
                constraint_type: "Avoid Late Sections".to_string(),
                description: format!(
                    "Subject {} with {} runs at {}, at or after {}.",
                    class.subject,
                    class.tutor,
                    slot,
                    options.late_from.format("%H:%M")
                ),
            });
        }
    }

    let w = options.weights;
    ScheduleScore {
        tutor_days,
        student_clashes,
        late_sections,
        weighted: w.tutor_days * f64::from(tutor_days)
            + w.student_clashes * f64::from(student_clashes)
            + w.late_slots * f64::from(late_sections),
        unmet_soft_constraints: unmet,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::scenario_data;

    fn class(subject: &str, timeslot: u32, tutor: &str, students: &[&str]) -> TimetabledClass {
        TimetabledClass {
            subject: subject.into(),
            timeslot,
            tutor: tutor.into(),
            timetable: 1,
            students: students.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn sound_schedule_has_no_violations() {
        let data = scenario_data();
        let classes = vec![
            class("ECON1", 1, "Ann", &["Jo", "Sam"]),
            class("ECON2", 2, "Bob", &["Jo"]),
        ];
        assert!(violations(&data, &classes).is_empty());

        let score = score(&data, &classes, &ModelOptions::default());
        assert_eq!(score.tutor_days, 2);
        assert_eq!(score.student_clashes, 0);
        assert_eq!(score.late_sections, 1);
        assert_eq!(score.weighted, 1001.0);
        assert_eq!(score.unmet_soft_constraints.len(), 1);
    }

    #[test]
    fn reports_broken_invariants() {
        let data = scenario_data();
        let classes = vec![
            // Bob is not free at slot 1 and Sam is missing
            class("ECON1", 1, "Ann", &["Jo"]),
            class("ECON2", 1, "Bob", &["Jo", "Sam"]),
        ];
        let found = violations(&data, &classes);

        assert!(found.iter().any(|v| v.contains("Bob is not available at slot 1")));
        assert!(found.iter().any(|v| v.contains("Sam attends ECON2 without being enrolled")));
        assert!(found.iter().any(|v| v.contains("Sam attends 0 sections of ECON1")));
    }

    #[test]
    fn counts_clashes_per_student_and_slot() {
        let mut data = scenario_data();
        for tutor in data.tutors.values_mut() {
            tutor.available.insert(1);
        }
        let classes = vec![
            class("ECON1", 1, "Ann", &["Jo", "Sam"]),
            class("ECON2", 1, "Bob", &["Jo"]),
        ];
        let score = score(&data, &classes, &ModelOptions::default());
        assert_eq!(score.student_clashes, 1);
        assert_eq!(score.late_sections, 0);
        assert_eq!(score.weighted, 1100.0);
    }
}
