use axum::Json;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "quartermaster API",
        description = "Exposes endpoints to interact with a quartermaster server"
    ),
    paths(
        crate::guilds::register_guild,
        crate::guilds::current_guild,
        crate::guilds::update_guild,
        crate::guilds::set_loot_lock,
        crate::guilds::transfer_leadership,
        crate::players::roster,
        crate::players::linked_alts,
        crate::players::link_alt,
        crate::players::unlink_alt,
        crate::players::set_hidden,
        crate::players::set_admin,
        crate::items::list_items,
        crate::items::create_item,
        crate::loot::list_loots,
        crate::loot::set_quantity,
        crate::loot::active_requests,
        crate::loot::archived_requests,
        crate::loot::create_request,
        crate::loot::delete_request,
        crate::loot::grant_request,
        crate::loot::finish_requests,
        crate::imports::import_guild_dump,
        crate::imports::import_raid_dump,
        crate::imports::import_raid_archive,
        crate::attendance::player_attendance,
        crate::sse::event_stream,
    ),
    components(schemas(
        crate::schemas::NewGuildSchema,
        crate::schemas::UpdateGuildSchema,
        crate::schemas::TransferLeadershipSchema,
        crate::schemas::LinkAltSchema,
        crate::schemas::NewItemSchema,
        crate::schemas::QuantitySchema,
        crate::schemas::NewLootRequestSchema,
        crate::serialized::Guild,
        crate::serialized::Player,
        crate::serialized::Registration,
        crate::serialized::Item,
        crate::serialized::Loot,
        crate::serialized::LootRequest,
        crate::serialized::Attendance,
        crate::imports::ImportSummary,
    )),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);

        components.add_security_scheme(
            "BearerAuth",
            SecurityScheme::Http(
                HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build(),
            ),
        );
    }
}

pub(crate) async fn serve_api() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
