use utoipa_axum::router::OpenApiRouter;
use utoipa_axum::routes;

use crate::handlers;
use crate::state::AppState;

pub fn routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .nest("/stories", story_routes())
        .nest("/media", media_routes())
}

fn story_routes() -> OpenApiRouter<AppState> {
    let crud = OpenApiRouter::new()
        .routes(routes!(
            handlers::story::get_feed,
            handlers::story::create_story
        ))
        .routes(routes!(handlers::story::list_my_stories))
        .routes(routes!(handlers::story::get_my_feed))
        .routes(routes!(handlers::story::get_publisher_feed))
        .routes(routes!(
            handlers::story::get_story,
            handlers::story::delete_story
        ))
        .routes(routes!(
            handlers::story::record_view,
            handlers::story::count_views
        ));

    let upload = OpenApiRouter::new()
        .routes(routes!(handlers::story::upload_story))
        .layer(handlers::story::upload_body_limit());

    crud.merge(upload)
}

fn media_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(routes!(handlers::media::get_media))
}
