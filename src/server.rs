use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::Weekday;
use log::info;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::data::{Period, ScheduleParameters, StudentName, SubjectCode, TimetableId, TutorName};
use crate::jobs::{Job, JobRunner};
use crate::model::parse_time;
use crate::store::Records;

#[derive(Clone)]
pub struct AppState {
    pub runner: JobRunner,
    pub parameters: ScheduleParameters,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveRequest {
    pub period: Period,
    #[serde(default)]
    pub parameters: Option<ScheduleParameters>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobTicket {
    pub job_id: Uuid,
}

/// One row of a timetable listing.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassView {
    pub subject: SubjectCode,
    pub day: String,
    pub time: String,
    pub tutor: TutorName,
    pub students: Vec<StudentName>,
}

type ApiError = (StatusCode, String);

async fn load_records_handler(
    State(state): State<AppState>,
    Json(records): Json<Records>,
) -> Result<StatusCode, ApiError> {
    state
        .runner
        .store()
        .load(records)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;
    Ok(StatusCode::NO_CONTENT)
}

async fn solve_handler(
    State(state): State<AppState>,
    Json(request): Json<SolveRequest>,
) -> (StatusCode, Json<JobTicket>) {
    let parameters = request.parameters.unwrap_or(state.parameters);
    let job = state.runner.submit(request.period, parameters).await;
    (StatusCode::ACCEPTED, Json(JobTicket { job_id: job.id }))
}

async fn list_jobs_handler(State(state): State<AppState>) -> Json<Vec<Job>> {
    Json(state.runner.list().await)
}

async fn job_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Job>, ApiError> {
    state
        .runner
        .get(id)
        .await
        .map(Json)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("No job {id}")))
}

async fn classes_handler(
    State(state): State<AppState>,
    Path(timetable): Path<TimetableId>,
) -> Json<Vec<ClassView>> {
    let store = state.runner.store();
    let slots = store.timeslots(timetable);
    let mut rows: Vec<ClassView> = store
        .classes(timetable)
        .into_iter()
        .map(|class| {
            let (day, time) = slots
                .get(&class.timeslot)
                .map(|s| (s.day.clone(), s.time.clone()))
                .unwrap_or_default();
            ClassView {
                subject: class.subject,
                day,
                time,
                tutor: class.tutor,
                students: class.students.into_iter().collect(),
            }
        })
        .collect();
    rows.sort_by_key(|r| (day_rank(&r.day), parse_time(&r.time), r.subject.clone()));
    Json(rows)
}

async fn clear_classes_handler(
    State(state): State<AppState>,
    Path(timetable): Path<TimetableId>,
) -> Json<usize> {
    let removed = state.runner.store().clear_classes(timetable);
    info!("Cleared {removed} classes from timetable {timetable}");
    Json(removed)
}

/// Monday first; names chrono cannot parse sort last.
fn day_rank(day: &str) -> u32 {
    day.trim()
        .parse::<Weekday>()
        .map(|d| d.num_days_from_monday())
        .unwrap_or(7)
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/records", put(load_records_handler))
        .route("/v1/timetable/solve", post(solve_handler))
        .route("/v1/jobs", get(list_jobs_handler))
        .route("/v1/jobs/:id", get(job_handler))
        .route(
            "/v1/timetables/:timetable/classes",
            get(classes_handler).delete(clear_classes_handler),
        )
        .with_state(state)
}

pub async fn run_server(bind: &str, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;

    info!("Server running at http://{}", listener.local_addr()?);

    axum::serve(listener, router(state)).await
}

#[cfg(test)]
mod tests {
    use super::day_rank;

    #[test]
    fn weekdays_rank_from_monday() {
        assert_eq!(day_rank("Monday"), 0);
        assert_eq!(day_rank("fri"), 4);
        assert_eq!(day_rank("Someday"), 7);
    }
}
