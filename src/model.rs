use chrono::NaiveTime;
use good_lp::{Constraint, Expression, ProblemVariables, Variable, constraint, variable};
use itertools::Itertools;
use log::{debug, info, trace};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::data::{Day, SectionKey, StudentName, TimeslotId, Timeslot, TimetableData, TutorName};

/// Objective weights, highest weight minimised first.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectiveWeights {
    pub tutor_days: f64,
    pub student_clashes: f64,
    pub late_slots: f64,
}

impl Default for ObjectiveWeights {
    fn default() -> Self {
        Self {
            tutor_days: 500.0,
            student_clashes: 100.0,
            late_slots: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelOptions {
    /// Sections starting at or after this time count as late.
    pub late_from: NaiveTime,
    pub weights: ObjectiveWeights,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            late_from: NaiveTime::from_hms_opt(21, 30, 0).unwrap_or(NaiveTime::MIN),
            weights: ObjectiveWeights::default(),
        }
    }
}

impl ModelOptions {
    pub fn is_late(&self, slot: &Timeslot) -> bool {
        parse_time(&slot.time).is_some_and(|t| t >= self.late_from)
    }
}

/// Reads a slot time written either on the 24-hour clock (`21:30`,
/// `21:30:00`) or the 12-hour clock (`9:30pm`, `9:30 PM`, `9pm`).
pub fn parse_time(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    if let Ok(time) = NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
    {
        return Some(time);
    }
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();
    ["%I:%M%p", "%I:%M:%S%p", "%I%p"]
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(&compact, format).ok())
}

pub type AssignKey = (StudentName, SectionKey);

/// The timetabling MILP: variables, constraints and objective.
///
/// `assign` and `runs` only exist for combinations the availability,
/// enrolment and teaching constraints allow; every absent combination is
/// fixed at zero. Indicators likewise only exist where the sum they track
/// can be non-zero.
pub struct TimetableModel {
    pub(crate) problem: ProblemVariables,
    pub(crate) objective: Expression,
    pub(crate) constraints: Vec<Constraint>,
    /// Constraints over no variables whose right-hand side cannot be met.
    pub infeasible: Vec<String>,
    pub weights: ObjectiveWeights,

    pub assign: BTreeMap<AssignKey, Variable>,
    pub runs: BTreeMap<SectionKey, Variable>,
    pub tutor_active_on_day: BTreeMap<(TutorName, Day), Variable>,
    pub tutor_days_worked: BTreeMap<TutorName, Variable>,
    pub student_clash_flag: BTreeMap<(StudentName, TimeslotId), Variable>,
    pub student_clash_count: BTreeMap<StudentName, Variable>,
    pub late_slot_count: BTreeMap<TimeslotId, Variable>,
}

impl TimetableModel {
    pub fn variable_count(&self) -> usize {
        self.assign.len()
            + self.runs.len()
            + self.tutor_active_on_day.len()
            + self.tutor_days_worked.len()
            + self.student_clash_flag.len()
            + self.student_clash_count.len()
            + self.late_slot_count.len()
    }

    pub fn constraint_count(&self) -> usize {
        self.constraints.len()
    }

    /// Requires a sum of binary variables to equal `rhs`.
    fn sum_equals(&mut self, vars: Vec<Variable>, rhs: u32, describe: impl FnOnce() -> String) {
        if vars.len() < rhs as usize {
            let reason = describe();
            debug!("Unsatisfiable constraint: {reason}");
            self.infeasible.push(reason);
            return;
        }
        if vars.is_empty() {
            return;
        }
        let total: Expression = vars.into_iter().sum();
        let rhs = f64::from(rhs);
        self.constraints.push(constraint!(total == rhs));
    }
}

/// Builds the model for `data`.
pub fn build(data: &TimetableData, options: &ModelOptions) -> TimetableModel {
    info!(
        "Setting up timetable model with {} students, {} subjects, {} timeslots and {} tutors...",
        data.students.len(),
        data.subjects.len(),
        data.timeslots.len(),
        data.tutors.len()
    );
    let params = data.params;
    let mut problem = ProblemVariables::new();

    // runs[u, t, m]: availability (1) and teaching set (4) prune the rest
    let mut runs = BTreeMap::new();
    for tutor in data.tutors.values() {
        for subject in &tutor.subjects {
            for &slot in tutor.available.iter().filter(|t| data.timeslots.contains_key(t)) {
                let key = SectionKey {
                    subject: subject.clone(),
                    timeslot: slot,
                    tutor: tutor.name.clone(),
                };
                runs.insert(key, problem.add(variable().binary()));
            }
        }
    }
    let sections_by_subject: BTreeMap<&str, Vec<&SectionKey>> = runs
        .keys()
        .map(|k: &SectionKey| (k.subject.as_str(), k))
        .into_group_map()
        .into_iter()
        .collect();

    // assign[s, u, t, m]: only enrolled pairs (2) on candidate sections
    let mut assign = BTreeMap::new();
    for subject in data.subjects.values() {
        let sections = sections_by_subject.get(subject.code.as_str());
        for student in &subject.students {
            for key in sections.into_iter().flatten() {
                let var = problem.add(variable().binary());
                assign.insert((student.clone(), SectionKey::clone(key)), var);
            }
        }
    }
    trace!(
        "Generated {} section variables and {} attendance variables out of a theoretical maximum of {} and {}.",
        runs.len(),
        assign.len(),
        data.subjects.len() * data.timeslots.len() * data.tutors.len(),
        data.students.len() * data.subjects.len() * data.timeslots.len() * data.tutors.len()
    );

    let mut model = TimetableModel {
        problem,
        objective: Expression::from(0.0),
        constraints: Vec::new(),
        infeasible: Vec::new(),
        weights: options.weights,
        assign,
        runs,
        tutor_active_on_day: BTreeMap::new(),
        tutor_days_worked: BTreeMap::new(),
        student_clash_flag: BTreeMap::new(),
        student_clash_count: BTreeMap::new(),
        late_slot_count: BTreeMap::new(),
    };

    info!("Adding enrolment constraints...");
    let mut by_enrolment = model
        .assign
        .iter()
        .map(|((s, k), v)| ((s.clone(), k.subject.clone()), *v))
        .into_group_map();
    for subject in data.subjects.values() {
        for student in &subject.students {
            let vars = by_enrolment
                .remove(&(student.clone(), subject.code.clone()))
                .unwrap_or_default();
            model.sum_equals(vars, 1, || {
                format!("{student} is enrolled in {} but no section can run", subject.code)
            });
        }
    }

    // attendance requires a running section
    let attend: Vec<Constraint> = model
        .assign
        .iter()
        .map(|((_, key), a)| {
            let (a, run) = (*a, model.runs[key]);
            constraint!(a <= run)
        })
        .collect();
    model.constraints.extend(attend);

    info!("Adding repeat constraints...");
    for tutor in data.tutors.values() {
        for code in &tutor.subjects {
            let Some(subject) = data.subjects.get(code) else {
                continue;
            };
            let vars = model
                .runs
                .iter()
                .filter(|(k, _)| k.subject == *code && k.tutor == tutor.name)
                .map(|(_, v)| *v)
                .collect();
            model.sum_equals(vars, subject.repeats, || {
                format!(
                    "{code} needs {} sections but {} has too few available slots",
                    subject.repeats, tutor.name
                )
            });
        }
    }

    info!("Adding concurrency and tutor overlap constraints...");
    let max_concurrent = f64::from(params.max_concurrent_classes);
    let by_slot = model.runs.iter().map(|(k, v)| (k.timeslot, *v)).into_group_map();
    for vars in by_slot.values() {
        if vars.len() > params.max_concurrent_classes as usize {
            let total: Expression = vars.iter().copied().sum();
            model.constraints.push(constraint!(total <= max_concurrent));
        }
    }
    let by_tutor_slot = model
        .runs
        .iter()
        .map(|(k, v)| ((k.tutor.as_str(), k.timeslot), *v))
        .into_group_map();
    for vars in by_tutor_slot.values().filter(|vars| vars.len() > 1) {
        let total: Expression = vars.iter().copied().sum();
        model.constraints.push(constraint!(total <= 1));
    }

    info!("Adding class size constraints...");
    let min_size = f64::from(params.min_class_size);
    let max_size = f64::from(params.max_class_size);
    let by_section = model
        .assign
        .iter()
        .map(|((_, k), v)| (k, *v))
        .into_group_map();
    let mut sizes = Vec::new();
    for (key, run) in &model.runs {
        let vars = by_section.get(key).map(Vec::as_slice).unwrap_or_default();
        let enrolled: Expression = vars.iter().copied().sum();
        if params.min_class_size > 0 {
            sizes.push(constraint!(enrolled.clone() >= min_size * *run));
        }
        if vars.len() > params.max_class_size as usize {
            sizes.push(constraint!(enrolled <= max_size));
        }
    }
    model.constraints.extend(sizes);

    add_tutor_day_indicators(&mut model, data);
    add_clash_indicators(&mut model, data);
    add_late_counts(&mut model, data, options);

    let w = options.weights;
    let days: Expression = model.tutor_days_worked.values().copied().sum();
    let clashes: Expression = model.student_clash_count.values().copied().sum();
    let late: Expression = model.late_slot_count.values().copied().sum();
    model.objective = w.tutor_days * days + w.student_clashes * clashes + w.late_slots * late;
    info!(
        "Objective defined over {} variables and {} constraints.",
        model.variable_count(),
        model.constraint_count()
    );

    model
}

/// `tutorActiveOnDay[m, d]` is squeezed between `c * sum` and `sum`, where
/// `sum` counts m's sections on d. With `c <= 1 / sum` for every reachable
/// sum the binary indicator is exactly `sum > 0`.
fn add_tutor_day_indicators(model: &mut TimetableModel, data: &TimetableData) {
    for tutor in data.tutors.keys() {
        let mut active_days = Vec::new();
        for (day, slots) in &data.days {
            let (used, vars): (BTreeSet<TimeslotId>, Vec<Variable>) = model
                .runs
                .iter()
                .filter(|(k, _)| k.tutor == *tutor && slots.contains(&k.timeslot))
                .map(|(k, v)| (k.timeslot, *v))
                .unzip();
            if vars.is_empty() {
                continue;
            }
            // one section per slot caps the daily sum at the slot count
            let coef = 0.1_f64.min(1.0 / used.len() as f64);

            let active = model.problem.add(variable().binary());
            let total: Expression = vars.into_iter().sum();
            model.constraints.push(constraint!(active >= coef * total.clone()));
            model.constraints.push(constraint!(active <= total));
            model.tutor_active_on_day.insert((tutor.clone(), day.clone()), active);
            active_days.push(active);
        }

        let worked = model.problem.add(variable().integer().min(0));
        let total: Expression = active_days.into_iter().sum();
        model.constraints.push(constraint!(worked == total));
        model.tutor_days_worked.insert(tutor.clone(), worked);
    }
}

/// `studentClashFlag[s, t]` sits between `c * (sum - 1)` and `sum / 2`, where
/// `sum` counts s's sections at t. The upper bound zeroes it for `sum <= 1`;
/// the lower bound forces it to one for `sum >= 2` as long as
/// `c * (sum - 1) <= 1`, so `c` shrinks for students taking many subjects.
fn add_clash_indicators(model: &mut TimetableModel, data: &TimetableData) {
    let enrolments: BTreeMap<&str, usize> = data
        .subjects
        .values()
        .flat_map(|s| s.students.iter().map(String::as_str))
        .counts()
        .into_iter()
        .collect();
    let by_student_slot: BTreeMap<(StudentName, TimeslotId), Vec<Variable>> = model
        .assign
        .iter()
        .map(|((s, k), v)| ((s.clone(), k.timeslot), *v))
        .into_group_map()
        .into_iter()
        .collect();

    let mut flags: BTreeMap<StudentName, Vec<Variable>> = BTreeMap::new();
    let mut constraints = Vec::new();
    for ((student, slot), vars) in by_student_slot {
        if vars.len() < 2 {
            continue;
        }
        let subjects = enrolments.get(student.as_str()).copied().unwrap_or(2).max(2);
        let coef = 0.15_f64.min(1.0 / (subjects - 1) as f64);

        let flag = model.problem.add(variable().binary());
        let total: Expression = vars.iter().copied().sum();
        constraints.push(constraint!(flag <= 0.5 * total.clone()));
        constraints.push(constraint!(flag >= coef * total - coef));
        flags.entry(student.clone()).or_default().push(flag);
        model.student_clash_flag.insert((student, slot), flag);
    }
    model.constraints.extend(constraints);

    for student in &data.students {
        let count = model.problem.add(variable().integer().min(0));
        let total: Expression = flags.remove(student).unwrap_or_default().into_iter().sum();
        model.constraints.push(constraint!(count == total));
        model.student_clash_count.insert(student.clone(), count);
    }
}

fn add_late_counts(model: &mut TimetableModel, data: &TimetableData, options: &ModelOptions) {
    for slot in data.timeslots.values() {
        let count = model.problem.add(variable().integer().min(0));
        if options.is_late(slot) {
            let total: Expression = model
                .runs
                .iter()
                .filter(|(k, _)| k.timeslot == slot.id)
                .map(|(_, v)| *v)
                .sum();
            model.constraints.push(constraint!(count == total));
        } else {
            model.constraints.push(constraint!(count == 0));
        }
        model.late_slot_count.insert(slot.id, count);
    }
}
