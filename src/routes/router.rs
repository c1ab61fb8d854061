use crate::controllers::upload::{AVATAR_LIMIT, PRODUCT_IMAGE_LIMIT, URL_PREFIX};
use crate::core::error::Error;
use crate::core::state::AppState;
use crate::routes::{admin, auth, product, upload, user};
use crate::utils;
use axum::{
    Router,
    extract::{DefaultBodyLimit, MatchedPath, Request},
    http::{Method, header},
    middleware,
    routing::{get, patch, post, put},
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{self, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::info_span;

// room for multipart boundaries and the other form fields
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub(crate) fn routes(state: AppState) -> Router {
    let authorized = middleware::from_fn_with_state(state.clone(), utils::auth::authorize);
    let admin_only = middleware::from_fn_with_state(state.clone(), utils::auth::authorize_admin);

    // /auth/...
    let auth_router = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    // /user/...
    let user_router = Router::new()
        .route("/profile", get(user::get_profile).put(user::update_profile))
        .route("/password", patch(user::change_password))
        .route(
            "/avatar",
            post(user::upload_avatar)
                .layer(DefaultBodyLimit::max(AVATAR_LIMIT + MULTIPART_OVERHEAD)),
        )
        .route_layer(authorized.clone());

    // /products/...
    let product_router = Router::new()
        .route(
            "/",
            get(product::list).merge(post(product::create).route_layer(authorized.clone())),
        )
        .route(
            "/my",
            get(product::mine).route_layer(authorized.clone()),
        )
        .route(
            "/{id}",
            get(product::get).merge(
                put(product::update)
                    .delete(product::delete)
                    .route_layer(authorized.clone()),
            ),
        );

    // /upload
    let upload_router = Router::new()
        .route(
            "/",
            post(upload::product_image)
                .layer(DefaultBodyLimit::max(PRODUCT_IMAGE_LIMIT + MULTIPART_OVERHEAD)),
        )
        .route_layer(authorized);

    // /admin/...
    let admin_router = Router::new()
        .route("/products", get(admin::list_products))
        .route_layer(admin_only);

    let uploads = ServeDir::new(state.upload_controller.root());

    Router::new()
        .route("/", get(|| async { "campus-market" }))
        .nest("/auth", auth_router)
        .nest("/user", user_router)
        .nest("/products", product_router)
        .nest("/upload", upload_router)
        .nest("/admin", admin_router)
        .nest_service(URL_PREFIX, uploads)
        .fallback(|| async { Error::RouteNotFound })
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                        let matched_path = request
                            .extensions()
                            .get::<MatchedPath>()
                            .map(MatchedPath::as_str);

                        info_span!(
                            "request",
                            method = ?request.method(),
                            matched_path,
                        )
                    }),
                )
                .layer(
                    CorsLayer::new()
                        .allow_methods([
                            Method::GET,
                            Method::POST,
                            Method::PUT,
                            Method::PATCH,
                            Method::DELETE,
                        ])
                        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
                        .allow_origin(cors::Any),
                ),
        )
}
