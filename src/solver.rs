use good_lp::{ResolutionError, Solution, SolutionStatus, SolverModel, Variable, default_solver};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

use crate::data::{Day, SectionKey, SolveStatus, StudentName, TimeslotId, TutorName};
use crate::model::{AssignKey, TimetableModel};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolverOptions {
    pub threads: i32,
    pub random_seed: i32,
    /// Seconds; `None` lets the search run to completion.
    pub time_limit: Option<f64>,
    pub log_to_console: bool,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            threads: 1,
            random_seed: 1234,
            time_limit: None,
            log_to_console: false,
        }
    }
}

/// Variable values read back from a solved model, rounded to integers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SolvedValues {
    pub runs: BTreeSet<SectionKey>,
    pub assign: BTreeSet<AssignKey>,
    pub tutor_active_on_day: BTreeMap<(TutorName, Day), bool>,
    pub tutor_days_worked: BTreeMap<TutorName, i64>,
    pub student_clash_flag: BTreeMap<(StudentName, TimeslotId), bool>,
    pub student_clash_count: BTreeMap<StudentName, i64>,
    pub late_slot_count: BTreeMap<TimeslotId, i64>,
    pub objective: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SolveOutcome {
    pub status: SolveStatus,
    /// Present only when `status` carries a usable assignment.
    pub values: Option<SolvedValues>,
}

impl SolveOutcome {
    fn without_values(status: SolveStatus) -> Self {
        Self { status, values: None }
    }
}

/// Solves the model with the HiGHS MILP solver, blocking until it stops.
pub fn solve(model: TimetableModel, options: &SolverOptions) -> SolveOutcome {
    if let Some(reason) = model.infeasible.first() {
        info!("Model is infeasible before solving: {reason}");
        return SolveOutcome::without_values(SolveStatus::Infeasible);
    }
    if model.variable_count() == 0 {
        info!("Model has no variables; nothing to schedule.");
        return SolveOutcome {
            status: SolveStatus::Optimal,
            values: Some(SolvedValues::default()),
        };
    }

    let start_time = Instant::now();
    let TimetableModel {
        problem,
        objective,
        constraints,
        weights,
        assign,
        runs,
        tutor_active_on_day,
        tutor_days_worked,
        student_clash_flag,
        student_clash_count,
        late_slot_count,
        ..
    } = model;

    let mut solver = problem
        .minimise(objective)
        .using(default_solver)
        .set_option("threads", options.threads)
        .set_option("random_seed", options.random_seed)
        .set_option("log_to_console", if options.log_to_console { "true" } else { "false" });
    if let Some(limit) = options.time_limit {
        solver = solver.set_option("time_limit", limit);
    }
    for c in constraints {
        solver.add_constraint(c);
    }

    info!("Starting MILP solver...");
    let solution = match solver.solve() {
        Ok(s) => s,
        Err(e) => {
            let status = status_of(&e);
            info!("Solver stopped after {:.2?}: {e} ({status})", start_time.elapsed());
            return SolveOutcome::without_values(status);
        }
    };
    let status = status_of_solution(solution.status());
    info!("Solution found in {:.2?} ({status})", start_time.elapsed());
    if !status.has_assignment() {
        warn!("Solver stopped early with an unproven incumbent; discarding it.");
        return SolveOutcome::without_values(status);
    }

    let is_set = |v: &Variable| solution.value(*v) > 0.5;
    let count = |v: &Variable| solution.value(*v).round() as i64;

    let mut values = SolvedValues {
        runs: runs.iter().filter(|&(_, v)| is_set(v)).map(|(k, _)| k.clone()).collect(),
        assign: assign.iter().filter(|&(_, v)| is_set(v)).map(|(k, _)| k.clone()).collect(),
        tutor_active_on_day: tutor_active_on_day.iter().map(|(k, v)| (k.clone(), is_set(v))).collect(),
        tutor_days_worked: tutor_days_worked.iter().map(|(k, v)| (k.clone(), count(v))).collect(),
        student_clash_flag: student_clash_flag.iter().map(|(k, v)| (k.clone(), is_set(v))).collect(),
        student_clash_count: student_clash_count.iter().map(|(k, v)| (k.clone(), count(v))).collect(),
        late_slot_count: late_slot_count.iter().map(|(k, v)| (*k, count(v))).collect(),
        objective: 0.0,
    };
    values.objective = weights.tutor_days * values.tutor_days_worked.values().sum::<i64>() as f64
        + weights.student_clashes * values.student_clash_count.values().sum::<i64>() as f64
        + weights.late_slots * values.late_slot_count.values().sum::<i64>() as f64;

    SolveOutcome {
        status,
        values: Some(values),
    }
}

/// HiGHS stops at its default relative MIP gap, so a gap-limited answer is
/// as optimal as this model asks for. A time or iteration limit leaves an
/// incumbent that was never proven, which is reported as not solved.
fn status_of_solution(status: SolutionStatus) -> SolveStatus {
    match status {
        SolutionStatus::Optimal | SolutionStatus::GapLimit => SolveStatus::Optimal,
        SolutionStatus::TimeLimit => SolveStatus::NotSolved,
    }
}

fn status_of(error: &ResolutionError) -> SolveStatus {
    match error {
        ResolutionError::Infeasible => SolveStatus::Infeasible,
        ResolutionError::Unbounded => SolveStatus::Unbounded,
        // a limit reached before any feasible point was found
        ResolutionError::Other(msg) if matches!(*msg, "NotSet" | "NoSolutionFound") => {
            SolveStatus::NotSolved
        }
        other => {
            warn!("Solver reported an error: {other}");
            SolveStatus::Undefined
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{SubjectSpec, TimetableData, Timeslot, TutorSpec};
    use crate::extract::extract;
    use crate::model::{ModelOptions, build};
    use crate::testing::{busy_week, scenario_data};

    fn run(data: &TimetableData) -> SolveOutcome {
        solve(build(data, &ModelOptions::default()), &SolverOptions::default())
    }

    #[test]
    fn scenario_is_optimal_with_one_day_per_tutor() {
        let outcome = run(&scenario_data());
        assert_eq!(outcome.status, SolveStatus::Optimal);

        let values = outcome.values.unwrap();
        assert_eq!(values.runs.len(), 2);
        assert_eq!(values.assign.len(), 3);
        assert_eq!(values.tutor_days_worked["Ann"], 1);
        assert_eq!(values.tutor_days_worked["Bob"], 1);
        assert_eq!(values.student_clash_count.values().sum::<i64>(), 0);
        // Bob's only slot is Tuesday 21:30
        assert_eq!(values.late_slot_count[&2], 1);
        assert_eq!(values.objective, 1001.0);
    }

    #[test]
    fn too_few_slots_for_repeats_is_infeasible() {
        let mut data = scenario_data();
        data.subjects.get_mut("ECON1").unwrap().repeats = 2;

        let outcome = run(&data);
        assert_eq!(outcome.status, SolveStatus::Infeasible);
        assert!(outcome.values.is_none());
    }

    #[test]
    fn no_room_for_any_section_is_infeasible() {
        let mut data = scenario_data();
        data.params.max_concurrent_classes = 0;

        let outcome = run(&data);
        assert_eq!(outcome.status, SolveStatus::Infeasible);
        assert!(outcome.values.is_none());
    }

    #[test]
    fn empty_data_is_trivially_optimal() {
        let outcome = run(&TimetableData::default());
        assert_eq!(outcome.status, SolveStatus::Optimal);
        assert_eq!(outcome.values, Some(SolvedValues::default()));
    }

    /// Every indicator must equal the activity it summarises.
    fn assert_indicators_match(data: &TimetableData, values: &SolvedValues) {
        for ((tutor, day), active) in &values.tutor_active_on_day {
            let sections = values
                .runs
                .iter()
                .filter(|k| k.tutor == *tutor && data.day_of(k.timeslot) == Some(day.as_str()))
                .count();
            assert_eq!(*active, sections > 0, "{tutor} on {day}");
        }
        for (tutor, days) in &values.tutor_days_worked {
            let active = values
                .tutor_active_on_day
                .iter()
                .filter(|((t, _), on)| t == tutor && **on)
                .count();
            assert_eq!(*days, active as i64);
        }
        for ((student, slot), flag) in &values.student_clash_flag {
            let sections = values
                .assign
                .iter()
                .filter(|(s, k)| s == student && k.timeslot == *slot)
                .count();
            assert_eq!(*flag, sections >= 2, "{student} at slot {slot}");
        }
        for (student, clashes) in &values.student_clash_count {
            let flagged = values
                .student_clash_flag
                .iter()
                .filter(|((s, _), on)| s == student && **on)
                .count();
            assert_eq!(*clashes, flagged as i64);
        }
    }

    #[test]
    fn indicators_agree_with_the_activity_they_track() {
        let (records, period) = busy_week();
        let data = extract(&records, &period, Default::default());
        let outcome = run(&data);
        assert_eq!(outcome.status, SolveStatus::Optimal);
        assert_indicators_match(&data, &outcome.values.unwrap());
    }

    #[test]
    fn unavoidable_clash_raises_the_flag() {
        let mut data = scenario_data();
        // Bob can now only teach when Ann does, and Jo takes both subjects
        data.tutors.get_mut("Bob").unwrap().available = BTreeSet::from([1]);

        let outcome = run(&data);
        assert_eq!(outcome.status, SolveStatus::Optimal);
        let values = outcome.values.unwrap();
        assert!(values.student_clash_flag[&("Jo".to_string(), 1)]);
        assert_eq!(values.student_clash_count["Jo"], 1);
        assert_eq!(values.student_clash_count["Sam"], 0);
        assert_eq!(values.objective, 1100.0);
        assert_indicators_match(&data, &values);
    }

    /// One tutor with twelve Monday slots and eleven subjects, two more
    /// tutors pinned to the first slot, and one student taking all thirteen.
    fn crowded_monday() -> TimetableData {
        let slots: Vec<Timeslot> = (1..=12)
            .map(|id| Timeslot {
                id,
                day: "Monday".into(),
                time: format!("{:02}:00", id + 7),
            })
            .collect();
        let mut subjects = BTreeMap::new();
        let mut tutors = BTreeMap::new();
        let mut add = |code: String, tutor: &str, available: BTreeSet<TimeslotId>| {
            subjects.insert(
                code.clone(),
                SubjectSpec {
                    code: code.clone(),
                    repeats: 1,
                    tutor: tutor.into(),
                    students: BTreeSet::from(["Jo".to_string()]),
                },
            );
            let spec = tutors.entry(tutor.to_string()).or_insert_with(|| TutorSpec {
                name: tutor.into(),
                ..TutorSpec::default()
            });
            spec.subjects.insert(code);
            spec.available.extend(available);
        };
        for n in 1..=11 {
            add(format!("ANN{n}"), "Ann", (1..=12).collect());
        }
        add("BOB1".into(), "Bob", BTreeSet::from([1]));
        add("CAT1".into(), "Cat", BTreeSet::from([1]));

        TimetableData {
            students: BTreeSet::from(["Jo".to_string()]),
            subjects,
            days: BTreeMap::from([("Monday".to_string(), slots.iter().map(|t| t.id).collect())]),
            timeslots: slots.into_iter().map(|t| (t.id, t)).collect(),
            tutors,
            params: Default::default(),
        }
    }

    #[test]
    fn indicators_hold_for_busy_tutors_and_students() {
        let data = crowded_monday();
        let outcome = run(&data);
        assert_eq!(outcome.status, SolveStatus::Optimal);
        let values = outcome.values.unwrap();

        assert_eq!(values.runs.iter().filter(|k| k.tutor == "Ann").count(), 11);
        assert!(values.tutor_active_on_day[&("Ann".to_string(), "Monday".to_string())]);
        assert_eq!(values.tutor_days_worked.values().sum::<i64>(), 3);
        assert!(values.student_clash_flag[&("Jo".to_string(), 1)]);
        assert_eq!(values.student_clash_count["Jo"], 1);
        assert_eq!(values.objective, 1600.0);
        assert_indicators_match(&data, &values);
    }

    #[test]
    fn limits_reached_without_proof_are_not_solved() {
        assert_eq!(status_of_solution(SolutionStatus::Optimal), SolveStatus::Optimal);
        assert_eq!(status_of_solution(SolutionStatus::GapLimit), SolveStatus::Optimal);
        assert_eq!(status_of_solution(SolutionStatus::TimeLimit), SolveStatus::NotSolved);
    }

    #[test]
    fn resolution_errors_map_to_statuses() {
        assert_eq!(status_of(&ResolutionError::Infeasible), SolveStatus::Infeasible);
        assert_eq!(status_of(&ResolutionError::Unbounded), SolveStatus::Unbounded);
        assert_eq!(status_of(&ResolutionError::Other("NotSet")), SolveStatus::NotSolved);
        assert_eq!(
            status_of(&ResolutionError::Other("NoSolutionFound")),
            SolveStatus::NotSolved
        );
        assert_eq!(status_of(&ResolutionError::Other("SolveError")), SolveStatus::Undefined);
        assert_eq!(
            status_of(&ResolutionError::Str("HiGHS error".into())),
            SolveStatus::Undefined
        );
    }

    #[test]
    fn tiny_time_limit_never_reports_an_unproven_optimum() {
        let (records, period) = busy_week();
        let data = extract(&records, &period, Default::default());
        let options = SolverOptions {
            time_limit: Some(0.0),
            ..SolverOptions::default()
        };
        let outcome = solve(build(&data, &ModelOptions::default()), &options);
        // presolve may still prove the optimum; anything else must carry no values
        if outcome.status != SolveStatus::Optimal {
            assert!(outcome.values.is_none());
        }
    }
}
