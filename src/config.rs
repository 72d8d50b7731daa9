use chrono::NaiveTime;
use clap::Parser;
use std::path::PathBuf;

use crate::data::ScheduleParameters;
use crate::engine::EngineOptions;
use crate::jobs::DEFAULT_JOB_RETENTION;
use crate::model::{ModelOptions, ObjectiveWeights, parse_time};
use crate::solver::SolverOptions;

/// Tutorial timetabling service
#[derive(Parser, Debug, Clone)]
#[command(name = "tutor_timetabler")]
#[command(version)]
pub struct Config {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:8080", env = "TIMETABLER_BIND")]
    pub bind: String,

    /// JSON records snapshot to load at startup
    #[arg(long, env = "TIMETABLER_SEED")]
    pub seed: Option<PathBuf>,

    #[arg(long, default_value_t = 400, env = "TIMETABLER_MAX_CLASS_SIZE")]
    pub max_class_size: u32,

    #[arg(long, default_value_t = 1, env = "TIMETABLER_MIN_CLASS_SIZE")]
    pub min_class_size: u32,

    /// Most sections allowed in one timeslot (rooms available)
    #[arg(long, default_value_t = 12, env = "TIMETABLER_MAX_CONCURRENT_CLASSES")]
    pub max_concurrent_classes: u32,

    /// Sections starting at or after this time (HH:MM) are penalised
    #[arg(long, default_value = "21:30", value_parser = parse_late_from, env = "TIMETABLER_LATE_FROM")]
    pub late_from: NaiveTime,

    /// Solver time limit in seconds; unlimited when unset
    #[arg(long, env = "TIMETABLER_TIME_LIMIT")]
    pub time_limit: Option<f64>,

    #[arg(long, default_value_t = 1, env = "TIMETABLER_THREADS")]
    pub threads: i32,

    #[arg(long, default_value_t = 1234, env = "TIMETABLER_RANDOM_SEED")]
    pub random_seed: i32,

    /// Finished jobs kept for polling
    #[arg(long, default_value_t = DEFAULT_JOB_RETENTION, env = "TIMETABLER_JOB_RETENTION")]
    pub job_retention: usize,

    /// Print HiGHS progress to stdout
    #[arg(long, env = "TIMETABLER_SOLVER_LOG")]
    pub solver_log: bool,
}

fn parse_late_from(raw: &str) -> Result<NaiveTime, String> {
    parse_time(raw).ok_or_else(|| format!("expected HH:MM or h:mmpm, got {raw:?}"))
}

impl Config {
    pub fn parameters(&self) -> ScheduleParameters {
        ScheduleParameters {
            max_class_size: self.max_class_size,
            min_class_size: self.min_class_size,
            max_concurrent_classes: self.max_concurrent_classes,
        }
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            model: ModelOptions {
                late_from: self.late_from,
                weights: ObjectiveWeights::default(),
            },
            solver: SolverOptions {
                threads: self.threads,
                random_seed: self.random_seed,
                time_limit: self.time_limit,
                log_to_console: self.solver_log,
            },
        }
    }
}
