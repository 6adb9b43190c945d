use axum::{extract::State, routing::post, Extension, Json, Router};
use chrono::Utc;
use rail_booking::SweepReport;
use rail_core::identity::require_role;
use rail_core::{Principal, Role};

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/admin/sweep", post(run_sweep))
}

/// POST /v1/admin/sweep
/// Runs one reclamation pass now instead of waiting for the worker.
async fn run_sweep(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<SweepReport>, AppError> {
    require_role(&principal, Role::Admin)?;

    let report = state.sweep.run(Utc::now()).await;
    state.metrics.record_sweep(&report);
    tracing::info!(
        admin = %principal.user_id,
        expired = report.expired_count,
        errors = report.errors.len(),
        "Manual sweep"
    );

    Ok(Json(report))
}
