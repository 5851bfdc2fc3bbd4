use axum::{
    extract::{Multipart, Query, State},
    routing::post,
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    auth::Session, context::ServerContext, errors::ServerError, errors::ServerResult,
    schemas::OffsetQuery, Router,
};

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    /// Attendees recorded, or files processed for a bulk upload
    pub imported: usize,
}

/// Pulls the first file field out of a multipart upload
async fn file_field(mut multipart: Multipart) -> Result<(String, Vec<u8>), ServerError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ServerError::BadRequest(e.to_string()))?
    {
        let Some(name) = field.file_name().map(str::to_string) else {
            continue;
        };

        let bytes = field
            .bytes()
            .await
            .map_err(|e| ServerError::BadRequest(e.to_string()))?;

        return Ok((name, bytes.to_vec()));
    }

    Err(ServerError::BadRequest(
        "The upload contains no file".to_string(),
    ))
}

#[utoipa::path(
    post,
    path = "/v1/imports/guild-dump",
    tag = "imports",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200),
        (status = 400, description = "The dump was rejected, nothing was written")
    )
)]
pub(crate) async fn import_guild_dump(
    session: Session,
    State(context): State<ServerContext>,
    multipart: Multipart,
) -> ServerResult<()> {
    session.require_admin()?;

    let (_, bytes) = file_field(multipart).await?;
    let text = String::from_utf8_lossy(&bytes);

    context
        .app
        .imports
        .import_roster(session.guild(), &text)
        .await?;

    Ok(())
}

#[utoipa::path(
    post,
    path = "/v1/imports/raid-dump",
    tag = "imports",
    params(
        ("offset" = i64, Query, description = "The uploader's UTC offset in minutes")
    ),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = ImportSummary)
    )
)]
pub(crate) async fn import_raid_dump(
    session: Session,
    State(context): State<ServerContext>,
    Query(query): Query<OffsetQuery>,
    multipart: Multipart,
) -> ServerResult<Json<ImportSummary>> {
    session.require_admin()?;

    let (name, bytes) = file_field(multipart).await?;

    let imported = context
        .app
        .imports
        .import_raid_dump(session.guild(), &name, &bytes, query.offset)
        .await?;

    Ok(Json(ImportSummary { imported }))
}

#[utoipa::path(
    post,
    path = "/v1/imports/raid-dump/bulk",
    tag = "imports",
    params(
        ("offset" = i64, Query, description = "The uploader's UTC offset in minutes")
    ),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = ImportSummary)
    )
)]
pub(crate) async fn import_raid_archive(
    session: Session,
    State(context): State<ServerContext>,
    Query(query): Query<OffsetQuery>,
    multipart: Multipart,
) -> ServerResult<Json<ImportSummary>> {
    session.require_admin()?;

    let (_, bytes) = file_field(multipart).await?;

    let imported = context
        .app
        .imports
        .import_raid_archive(session.guild(), &bytes, query.offset)
        .await?;

    Ok(Json(ImportSummary { imported }))
}

pub fn router() -> Router {
    Router::new()
        .route("/guild-dump", post(import_guild_dump))
        .route("/raid-dump", post(import_raid_dump))
        .route("/raid-dump/bulk", post(import_raid_archive))
}
