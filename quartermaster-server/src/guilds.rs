use axum::{
    extract::{Query, State},
    routing::{get, post, put},
    Json,
};
use quartermaster_core::{NewGuildRegistration, UpdatedGuild};

use crate::{
    auth::Session,
    context::ServerContext,
    errors::ServerResult,
    schemas::{LockQuery, NewGuildSchema, TransferLeadershipSchema, UpdateGuildSchema, ValidatedJson},
    serialized::{Guild, Player, Registration, ToSerialized},
    Router,
};

#[utoipa::path(
    post,
    path = "/v1/guilds",
    tag = "guilds",
    request_body = NewGuildSchema,
    responses(
        (status = 200, body = Registration)
    )
)]
pub(crate) async fn register_guild(
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<NewGuildSchema>,
) -> ServerResult<Json<Registration>> {
    let registered = context
        .app
        .auth
        .register_guild(NewGuildRegistration {
            guild_name: body.name,
            server: body.server,
            leader_name: body.leader_name,
            leader_class: body.leader_class,
        })
        .await?;

    Ok(Json(registered.to_serialized()))
}

#[utoipa::path(
    get,
    path = "/v1/guilds",
    tag = "guilds",
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Guild)
    )
)]
pub(crate) async fn current_guild(session: Session) -> Json<Guild> {
    Json(session.guild().to_serialized())
}

#[utoipa::path(
    put,
    path = "/v1/guilds",
    tag = "guilds",
    request_body = UpdateGuildSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Guild)
    )
)]
pub(crate) async fn update_guild(
    session: Session,
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<UpdateGuildSchema>,
) -> ServerResult<Json<Guild>> {
    session.require_admin()?;

    let updated = context
        .app
        .guilds
        .update_settings(UpdatedGuild {
            id: session.guild().id,
            motd: body.motd,
            raid_webhook: body.raid_webhook,
            rot_webhook: body.rot_webhook,
        })
        .await?;

    Ok(Json(updated.to_serialized()))
}

#[utoipa::path(
    post,
    path = "/v1/guilds/lock",
    tag = "guilds",
    params(
        ("enable" = bool, Query, description = "Whether loot requesting should be locked")
    ),
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200)
    )
)]
pub(crate) async fn set_loot_lock(
    session: Session,
    State(context): State<ServerContext>,
    Query(query): Query<LockQuery>,
) -> ServerResult<()> {
    session.require_admin()?;

    context
        .app
        .guilds
        .set_loot_lock(session.guild(), query.enable)
        .await?;

    Ok(())
}

#[utoipa::path(
    post,
    path = "/v1/guilds/leadership",
    tag = "guilds",
    request_body = TransferLeadershipSchema,
    security(
        ("BearerAuth" = [])
    ),
    responses(
        (status = 200, body = Player)
    )
)]
pub(crate) async fn transfer_leadership(
    session: Session,
    State(context): State<ServerContext>,
    ValidatedJson(body): ValidatedJson<TransferLeadershipSchema>,
) -> ServerResult<Json<Player>> {
    context.app.guilds.ensure_leader(session.player()).await?;

    let successor = context
        .app
        .guilds
        .transfer_leadership(session.guild(), session.player(), &body.successor)
        .await?;

    Ok(Json(successor.to_serialized()))
}

pub fn router() -> Router {
    Router::new()
        .route("/", post(register_guild).get(current_guild).put(update_guild))
        .route("/lock", post(set_loot_lock))
        .route("/leadership", post(transfer_leadership))
}
