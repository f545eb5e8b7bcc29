use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    response::Html,
    routing::{delete, get, post, put},
    Json, Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;

use crate::{handlers, middleware, openapi::ApiDoc, AppState};

pub fn build_router(state: Arc<AppState>) -> Result<Router, String> {
    let origin = state
        .config
        .cors_origin
        .parse::<HeaderValue>()
        .map_err(|e| format!("Invalid CORS_ORIGIN {}: {}", state.config.cors_origin, e))?;

    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
            HeaderName::from_static("x-kiosk-token"),
            HeaderName::from_static("x-request-id"),
        ])
        .allow_credentials(true);

    // Auth routes
    let auth_routes = Router::new().route("/me", get(handlers::auth_handler::get_me));

    // Employee routes; fixed segments come before /{id}
    let employee_routes = Router::new()
        .route(
            "/",
            get(handlers::employees_handler::get_employees).post(handlers::employees_handler::create_employee),
        )
        .route("/next-number", get(handlers::employees_handler::get_next_employee_number))
        .route("/generate-pin", post(handlers::employees_handler::generate_pin))
        .route(
            "/{id}",
            get(handlers::employees_handler::get_employee).put(handlers::employees_handler::update_employee),
        )
        .route("/{id}/face-enrollment", post(handlers::employees_handler::enroll_face));

    // Assignment routes
    let assignment_routes = Router::new()
        .route(
            "/",
            get(handlers::assignments_handler::get_assignments).post(handlers::assignments_handler::create_assignment),
        )
        .route("/{id}", put(handlers::assignments_handler::update_assignment))
        .route("/{id}/terminate", post(handlers::assignments_handler::terminate_assignment))
        .route("/{id}/summary", get(handlers::assignments_handler::get_assignment_summary));

    let schedule_routes =
        Router::new().route("/preview", post(handlers::assignments_handler::preview_schedule));

    // Time entry routes
    let time_entry_routes = Router::new()
        .route("/", get(handlers::time_entries_handler::get_time_entries))
        .route("/pending-review", get(handlers::time_entries_handler::get_pending_review))
        .route("/{id}", put(handlers::time_entries_handler::adjust_time_entry))
        .route("/{id}/approve", post(handlers::time_entries_handler::approve_time_entry));

    // Kiosk management (session) and device configuration (kiosk token)
    let kiosk_admin_routes = Router::new()
        .route(
            "/",
            get(handlers::kiosks_handler::get_kiosks).post(handlers::kiosks_handler::create_kiosk),
        )
        .route(
            "/{id}",
            put(handlers::kiosks_handler::update_kiosk).delete(handlers::kiosks_handler::delete_kiosk),
        )
        .route("/{id}/url-token", post(handlers::kiosks_handler::create_kiosk_url_token))
        .route(
            "/{id}/configure",
            get(handlers::kiosks_handler::get_kiosk_configuration)
                .post(handlers::kiosks_handler::configure_kiosk)
                .delete(handlers::kiosks_handler::clear_kiosk_configuration),
        );

    // Kiosk device routes (kiosk token)
    let kiosk_routes = Router::new()
        .route("/status", get(handlers::kiosk_punch_handler::get_kiosk_status))
        .route("/punch", post(handlers::kiosk_punch_handler::kiosk_punch));

    // Invitation routes
    let invitation_routes = Router::new()
        .route("/", post(handlers::invitations_handler::create_invitation))
        .route("/verify/{token}", get(handlers::invitations_handler::verify_invitation))
        .route("/accept/{token}", post(handlers::invitations_handler::accept_invitation))
        .route("/{id}", delete(handlers::invitations_handler::cancel_invitation));

    // Audit routes
    let audit_routes = Router::new().route("/", get(handlers::audit_handler::get_audit));

    // Report routes
    let report_routes =
        Router::new().route("/timecards", get(handlers::reports_handler::get_timecard_report));

    // Preference routes
    let preference_routes = Router::new().route(
        "/{key}",
        get(handlers::preferences_handler::get_preference)
            .put(handlers::preferences_handler::put_preference)
            .delete(handlers::preferences_handler::delete_preference),
    );

    // Operational routes behind X-Debug-Key
    let debug_routes = Router::new()
        .route("/metrics", get(handlers::metrics_handler))
        .route_layer(from_fn_with_state(state.clone(), middleware::require_debug_key));

    Ok(Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api/auth", auth_routes)
        .nest("/api/employees", employee_routes)
        .nest("/api/assignments", assignment_routes)
        .nest("/api/schedules", schedule_routes)
        .nest("/api/time-entries", time_entry_routes)
        .nest("/api/kiosks", kiosk_admin_routes)
        .nest("/api/kiosk", kiosk_routes)
        .nest("/api/invitations", invitation_routes)
        .nest("/api/audit", audit_routes)
        .nest("/api/reports", report_routes)
        .nest("/api/preferences", preference_routes)
        .merge(debug_routes)
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        .route("/swagger-ui", get(swagger_ui))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = tracing::field::Empty,
                    )
                }))
                .layer(from_fn(middleware::request_id_middleware))
                .layer(from_fn(middleware::metrics_middleware)),
        )
        .layer(cors)
        .with_state(state))
}

async fn swagger_ui() -> Html<&'static str> {
    Html(r#"
<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Detail Hub API Documentation</title>
    <link rel="stylesheet" type="text/css" href="https://unpkg.com/swagger-ui-dist@5/swagger-ui.css" />
</head>
<body>
    <div id="swagger-ui"></div>
    <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-bundle.js"></script>
    <script src="https://unpkg.com/swagger-ui-dist@5/swagger-ui-standalone-preset.js"></script>
    <script>
        window.onload = () => {
            window.ui = SwaggerUIBundle({
                url: '/api-docs/openapi.json',
                dom_id: '#swagger-ui',
                presets: [
                    SwaggerUIBundle.presets.apis,
                    SwaggerUIStandalonePreset
                ],
                layout: "StandaloneLayout"
            });
        };
    </script>
</body>
</html>
    "#)
}
