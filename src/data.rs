use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

// Type aliases for clarity
pub type StudentName = String;
pub type SubjectCode = String;
pub type TutorName = String;
pub type Day = String;
pub type TimeslotId = u32;
pub type TimetableId = u32;

/// Identifies the scheduling period a solve reads from and writes into.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Period {
    pub year: i32,
    pub study_period: String,
    pub timetable: TimetableId,
}

/// Externally supplied bounds, constant for one solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleParameters {
    pub max_class_size: u32,
    pub min_class_size: u32,
    pub max_concurrent_classes: u32,
}

impl Default for ScheduleParameters {
    fn default() -> Self {
        Self {
            max_class_size: 400,
            min_class_size: 1,
            max_concurrent_classes: 12,
        }
    }
}

/// A (day, time) slot of the current timetable.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Timeslot {
    pub id: TimeslotId,
    pub day: Day,
    pub time: String,
}

impl fmt::Display for Timeslot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.day, self.time)
    }
}

/// A schedulable subject: it has a tutor and must run `repeats` sections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectSpec {
    pub code: SubjectCode,
    pub repeats: u32,
    pub tutor: TutorName,
    pub students: BTreeSet<StudentName>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TutorSpec {
    pub name: TutorName,
    pub subjects: BTreeSet<SubjectCode>,
    /// Explicit allow-list; a slot missing here is unavailable.
    pub available: BTreeSet<TimeslotId>,
}

/// Flat collections handed from the extractor to the model builder.
#[derive(Debug, Clone, Default)]
pub struct TimetableData {
    pub students: BTreeSet<StudentName>,
    pub subjects: BTreeMap<SubjectCode, SubjectSpec>,
    pub timeslots: BTreeMap<TimeslotId, Timeslot>,
    pub days: BTreeMap<Day, BTreeSet<TimeslotId>>,
    pub tutors: BTreeMap<TutorName, TutorSpec>,
    pub params: ScheduleParameters,
}

impl TimetableData {
    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty() && self.timeslots.is_empty()
    }

    pub fn day_of(&self, slot: TimeslotId) -> Option<&str> {
        self.timeslots.get(&slot).map(|t| t.day.as_str())
    }
}

/// One occurrence of a subject at a timeslot with a tutor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionKey {
    pub subject: SubjectCode,
    pub timeslot: TimeslotId,
    pub tutor: TutorName,
}

/// A scheduled section together with its roster.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimetabledClass {
    pub subject: SubjectCode,
    pub timeslot: TimeslotId,
    pub tutor: TutorName,
    pub timetable: TimetableId,
    pub students: BTreeSet<StudentName>,
}

impl TimetabledClass {
    pub fn key(&self) -> SectionKey {
        SectionKey {
            subject: self.subject.clone(),
            timeslot: self.timeslot,
            tutor: self.tutor.clone(),
        }
    }
}

/// Terminal status reported by the solver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum SolveStatus {
    Optimal,
    Infeasible,
    Unbounded,
    Undefined,
    #[serde(rename = "Not Solved")]
    NotSolved,
}

impl SolveStatus {
    /// Whether variables carry a usable 0/1 assignment.
    pub fn has_assignment(self) -> bool {
        self == SolveStatus::Optimal
    }
}

impl fmt::Display for SolveStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SolveStatus::Optimal => "Optimal",
            SolveStatus::Infeasible => "Infeasible",
            SolveStatus::Unbounded => "Unbounded",
            SolveStatus::Undefined => "Undefined",
            SolveStatus::NotSolved => "Not Solved",
        };
        f.write_str(s)
    }
}

/// Describes a soft constraint that was not met in the final schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnmetSoftConstraint {
    pub constraint_type: String,
    pub description: String,
}

impl fmt::Display for UnmetSoftConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.constraint_type, self.description)
    }
}

/// Soft objective terms recomputed from a materialised schedule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleScore {
    pub tutor_days: u32,
    pub student_clashes: u32,
    pub late_sections: u32,
    pub weighted: f64,
    pub unmet_soft_constraints: Vec<UnmetSoftConstraint>,
}

/// Outcome of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub status: SolveStatus,
    pub classes_created: usize,
    pub score: Option<ScheduleScore>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings_match_solver_vocabulary() {
        assert_eq!(SolveStatus::NotSolved.to_string(), "Not Solved");
        assert_eq!(
            serde_json::to_string(&SolveStatus::NotSolved).unwrap(),
            "\"Not Solved\""
        );
        assert!(SolveStatus::Optimal.has_assignment());
        assert!(!SolveStatus::Infeasible.has_assignment());
    }

    #[test]
    fn parameters_default_to_venue_limits() {
        let params = ScheduleParameters::default();
        assert_eq!(params.max_class_size, 400);
        assert_eq!(params.min_class_size, 1);
        assert_eq!(params.max_concurrent_classes, 12);
    }
}
