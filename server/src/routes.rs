//! HTTP surface over [`Catalog`]. Callers are assumed to be authorized
//! upstream; this layer only translates JSON and maps errors to statuses.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, FromRequestParts, Path, Query, Request, State};
use axum::http::request::Parts;
use axum::http::{Method, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use mbaal_common::aggregate::ReconcileReport;
use mbaal_common::catalog::join_path;
use mbaal_common::category::{CategoryStatus, CategoryTotals};
use mbaal_common::product::{ProductStatus, ProductVisibility};
use mbaal_common::store::page_limit;
use mbaal_common::{
    Catalog, CatalogError, Category, CategoryDeletion, CategoryFilter, CategoryId, CategoryInput,
    CategoryPatch, CategoryTreeNode, ParentFilter, Product, ProductFilter, ProductId,
    ProductInput, ProductPatch,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error};

pub struct AppState {
    pub catalog: Catalog,
    /// `"memory"` or `"postgres"`, reported by `/health`.
    pub store: &'static str,
}

// ─── API types ───────────────────────────────────────────────────────────────

#[derive(Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    store: String,
}

#[derive(Deserialize, Default)]
struct CategoryQuery {
    /// A category id, or `root` for top-level categories.
    parent: Option<String>,
    level: Option<u8>,
    status: Option<CategoryStatus>,
    empty: Option<bool>,
    skip: Option<usize>,
    limit: Option<usize>,
}

impl CategoryQuery {
    fn into_filter(self) -> CategoryFilter {
        let parent = match self.parent.as_deref() {
            None => ParentFilter::Any,
            Some("root") => ParentFilter::Root,
            Some(id) => ParentFilter::Under(CategoryId::from(id)),
        };
        CategoryFilter {
            parent,
            level: self.level,
            status: self.status,
            empty_only: self.empty.unwrap_or(false),
            skip: self.skip.unwrap_or(0),
            limit: Some(page_limit(self.limit)),
        }
    }
}

#[derive(Deserialize, Default)]
struct ProductQuery {
    category: Option<CategoryId>,
    status: Option<ProductStatus>,
    visibility: Option<ProductVisibility>,
    skip: Option<usize>,
    limit: Option<usize>,
}

impl ProductQuery {
    fn into_filter(self) -> ProductFilter {
        ProductFilter {
            category: self.category,
            status: self.status,
            visibility: self.visibility,
            skip: self.skip.unwrap_or(0),
            limit: Some(page_limit(self.limit)),
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct PathResponse {
    pub path: String,
    pub breadcrumbs: Vec<Category>,
}

// ─── Errors ──────────────────────────────────────────────────────────────────

fn status_for(e: &CatalogError) -> StatusCode {
    if e.is_not_found() {
        StatusCode::NOT_FOUND
    } else if e.is_conflict() {
        StatusCode::CONFLICT
    } else if e.is_client_error() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    }
}

fn api_error(e: CatalogError) -> ApiError {
    let status = status_for(&e);
    let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("Catalog operation failed: {}", e);
        "Internal server error".to_string()
    } else {
        e.to_string()
    };
    (status, Json(ErrorResponse { error: message }))
}

fn bad_request(message: String) -> ApiError {
    debug!("Rejected request: {}", message);
    (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: message }))
}

// ─── Extractors ──────────────────────────────────────────────────────────────

/// `Json` whose rejections use the `{"error": ...}` body with status 400.
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(bad_request(rejection.body_text())),
        }
    }
}

/// `Query` whose rejections use the `{"error": ...}` body with status 400.
pub struct ApiQuery<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(ApiQuery(value)),
            Err(rejection) => Err(bad_request(rejection.body_text())),
        }
    }
}

// ─── Health ──────────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        store: state.store.to_string(),
    })
}

// ─── Category Handlers ───────────────────────────────────────────────────────

async fn list_categories_handler(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<CategoryQuery>,
) -> ApiResult<Vec<Category>> {
    let filter = query.into_filter();
    state.catalog.categories(&filter).await.map(Json).map_err(api_error)
}

async fn create_category_handler(
    State(state): State<Arc<AppState>>,
    ApiJson(input): ApiJson<CategoryInput>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    let category = state.catalog.create_category(input).await.map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(category)))
}

async fn tree_handler(State(state): State<Arc<AppState>>) -> ApiResult<Vec<CategoryTreeNode>> {
    state.catalog.tree().await.map(Json).map_err(api_error)
}

async fn stats_handler(State(state): State<Arc<AppState>>) -> ApiResult<CategoryTotals> {
    state.catalog.category_stats().await.map(Json).map_err(api_error)
}

async fn empty_categories_handler(
    State(state): State<Arc<AppState>>,
) -> ApiResult<Vec<Category>> {
    state.catalog.empty_categories().await.map(Json).map_err(api_error)
}

async fn category_by_slug_handler(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> ApiResult<Category> {
    state.catalog.category_by_slug(&slug).await.map(Json).map_err(api_error)
}

async fn get_category_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<CategoryId>,
) -> ApiResult<Category> {
    state.catalog.category(&id).await.map(Json).map_err(api_error)
}

async fn update_category_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<CategoryId>,
    ApiJson(patch): ApiJson<CategoryPatch>,
) -> ApiResult<Category> {
    state
        .catalog
        .update_category(&id, patch)
        .await
        .map(Json)
        .map_err(api_error)
}

async fn delete_category_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<CategoryId>,
) -> ApiResult<CategoryDeletion> {
    state.catalog.delete_category(&id).await.map(Json).map_err(api_error)
}

async fn children_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<CategoryId>,
) -> ApiResult<Vec<Category>> {
    state.catalog.children(&id).await.map(Json).map_err(api_error)
}

async fn path_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<CategoryId>,
) -> ApiResult<PathResponse> {
    let breadcrumbs = state.catalog.breadcrumbs(&id).await.map_err(api_error)?;
    let path = join_path(&breadcrumbs);
    Ok(Json(PathResponse { path, breadcrumbs }))
}

// ─── Product Handlers ────────────────────────────────────────────────────────

async fn list_products_handler(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<ProductQuery>,
) -> ApiResult<Vec<Product>> {
    let filter = query.into_filter();
    state.catalog.products(&filter).await.map(Json).map_err(api_error)
}

async fn create_product_handler(
    State(state): State<Arc<AppState>>,
    ApiJson(input): ApiJson<ProductInput>,
) -> Result<(StatusCode, Json<Product>), ApiError> {
    let product = state.catalog.create_product(input).await.map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(product)))
}

async fn product_by_slug_handler(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
) -> ApiResult<Product> {
    state.catalog.product_by_slug(&slug).await.map(Json).map_err(api_error)
}

async fn get_product_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ProductId>,
) -> ApiResult<Product> {
    state.catalog.product(&id).await.map(Json).map_err(api_error)
}

async fn update_product_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ProductId>,
    ApiJson(patch): ApiJson<ProductPatch>,
) -> ApiResult<Product> {
    state
        .catalog
        .update_product(&id, patch)
        .await
        .map(Json)
        .map_err(api_error)
}

async fn delete_product_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<ProductId>,
) -> ApiResult<Product> {
    state.catalog.delete_product(&id).await.map(Json).map_err(api_error)
}

// ─── Admin ───────────────────────────────────────────────────────────────────

async fn reconcile_handler(State(state): State<Arc<AppState>>) -> ApiResult<ReconcileReport> {
    state.catalog.reconcile_counts().await.map(Json).map_err(api_error)
}

// ─── Router ──────────────────────────────────────────────────────────────────

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/categories",
            get(list_categories_handler).post(create_category_handler),
        )
        .route("/categories/tree", get(tree_handler))
        .route("/categories/stats", get(stats_handler))
        .route("/categories/empty", get(empty_categories_handler))
        .route("/categories/slug/{slug}", get(category_by_slug_handler))
        .route(
            "/categories/{id}",
            get(get_category_handler)
                .patch(update_category_handler)
                .delete(delete_category_handler),
        )
        .route("/categories/{id}/children", get(children_handler))
        .route("/categories/{id}/path", get(path_handler))
        .route(
            "/products",
            get(list_products_handler).post(create_product_handler),
        )
        .route("/products/slug/{slug}", get(product_by_slug_handler))
        .route(
            "/products/{id}",
            get(get_product_handler)
                .patch(update_product_handler)
                .delete(delete_product_handler),
        )
        .route("/admin/reconcile", post(reconcile_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
