use axum::{extract::State, routing::get, Json};

use crate::{
    auth::Session,
    context::ServerContext,
    errors::ServerResult,
    serialized::{Attendance, ToSerialized},
    Router,
};

#[utoipa::path(
    get,
    path = "/v1/attendance",
    tag = "attendance",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Vec<Attendance>)
    )
)]
pub(crate) async fn player_attendance(
    session: Session,
    State(context): State<ServerContext>,
) -> ServerResult<Json<Vec<Attendance>>> {
    let attendance = context
        .app
        .attendance
        .player_attendance(session.guild().id)
        .await?;

    Ok(Json(attendance.to_serialized()))
}

pub fn router() -> Router {
    Router::new().route("/", get(player_attendance))
}
