//! Assigns students to tutorial sections: extracts enrolment, tutor and
//! timeslot records for a scheduling period, builds a MILP over them, solves
//! it with HiGHS and writes back the chosen classes.

pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod extract;
pub mod jobs;
pub mod materialize;
pub mod model;
pub mod score;
pub mod server;
pub mod solver;
pub mod store;

#[cfg(test)]
mod testing;
