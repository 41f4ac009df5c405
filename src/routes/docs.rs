use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{services::documentation::ApiDoc, state::SharedState};

/// Mount the interactive API explorer.
///
/// The OpenAPI document is generated at startup from the annotated handlers
/// and served at `/api-doc/openapi.json`; the Swagger UI under `/docs` renders
/// it.
pub fn router(state: SharedState) -> Router<SharedState> {
    Router::from(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .with_state(state)
}
