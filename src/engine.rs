//! The timetabling pipeline: extract, build, solve, materialise.

use log::{info, warn};
use std::time::Instant;

use crate::data::{Period, RunReport, ScheduleParameters, SolveStatus};
use crate::error::Result;
use crate::extract::extract;
use crate::model::{self, ModelOptions};
use crate::solver::{self, SolverOptions};
use crate::store::MemoryStore;
use crate::{materialize, score};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineOptions {
    pub model: ModelOptions,
    pub solver: SolverOptions,
}

/// Runs one solve for `period` and commits the resulting classes.
///
/// A solve that ends without a usable assignment is reported through the
/// returned status and writes nothing. Errors are reserved for storage
/// failures.
pub fn run(
    store: &MemoryStore,
    period: &Period,
    params: ScheduleParameters,
    options: &EngineOptions,
) -> Result<RunReport> {
    let start_time = Instant::now();
    info!(
        "Preparing timetable for {} {} (timetable {})",
        period.year, period.study_period, period.timetable
    );
    let data = extract(&store.records(), period, params);
    let model = model::build(&data, &options.model);
    let outcome = solver::solve(model, &options.solver);
    info!("Status: {}", outcome.status);

    let Some(values) = outcome.values.filter(|_| outcome.status.has_assignment()) else {
        return Ok(RunReport {
            status: outcome.status,
            classes_created: 0,
            score: None,
        });
    };

    let classes = materialize::classes(&values, period.timetable);
    let violations = score::violations(&data, &classes);
    if !violations.is_empty() {
        for violation in &violations {
            warn!("Rejected assignment: {violation}");
        }
        return Ok(RunReport {
            status: SolveStatus::NotSolved,
            classes_created: 0,
            score: None,
        });
    }

    let score = score::score(&data, &classes, &options.model);
    for unmet in &score.unmet_soft_constraints {
        info!("{unmet}");
    }
    let classes_created = materialize::commit(store, classes)?;
    info!("Timetable complete in {:.2?}", start_time.elapsed());

    Ok(RunReport {
        status: outcome.status,
        classes_created,
        score: Some(score),
    })
}
