use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use shared::{Book, RentalPeriod, ReservationView, SyncSummary, User};
use tower_http::trace::TraceLayer;

use crate::catalog::CatalogClient;
use crate::directory::UserDirectory;
use crate::error::AppResult;
use crate::inventory::Inventory;
use crate::reservations::ReservationEngine;
use crate::DbPool;

#[derive(Clone)]
pub struct AppState {
    pub inventory: Inventory,
    pub users: UserDirectory,
    pub reservations: ReservationEngine,
    pub catalog: CatalogClient,
}

impl AppState {
    pub fn new(pool: DbPool, catalog: CatalogClient) -> Self {
        Self {
            inventory: Inventory::new(pool.clone()),
            users: UserDirectory::new(pool.clone()),
            reservations: ReservationEngine::new(pool),
            catalog,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateReservationRequest {
    pub user_id: i64,
    pub book_external_id: i64,
    pub rental_days: i32,
    pub start_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct ReturnBookRequest {
    pub return_date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct StockUpdate {
    pub stock_quantity: i32,
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub message: String,
    pub summary: SyncSummary,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/books", get(list_books))
        .route("/books/sync", post(sync_catalog))
        .route("/books/:external_id", get(get_book))
        .route("/books/:external_id/sync", post(sync_book))
        .route("/books/:external_id/stock", put(update_stock))
        .route("/users/:id", get(get_user))
        .route("/reservations", post(create_reservation).get(list_reservations))
        .route("/reservations/active", get(list_active_reservations))
        .route("/reservations/overdue", get(list_overdue_reservations))
        .route("/reservations/user/:user_id", get(list_user_reservations))
        .route("/reservations/:id", get(get_reservation))
        .route("/reservations/:id/return", post(return_book))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
}

pub async fn health_check() -> &'static str {
    "OK"
}

pub async fn sync_catalog(State(state): State<AppState>) -> AppResult<Json<SyncResponse>> {
    let summary = state.inventory.sync_catalog(&state.catalog).await?;
    Ok(Json(SyncResponse {
        message: "Books synchronized from the external catalog".to_string(),
        summary,
    }))
}

pub async fn sync_book(
    State(state): State<AppState>,
    Path(external_id): Path<i64>,
) -> AppResult<Json<Book>> {
    Ok(Json(state.inventory.sync_book(&state.catalog, external_id).await?))
}

pub async fn list_books(State(state): State<AppState>) -> AppResult<Json<Vec<Book>>> {
    Ok(Json(state.inventory.list_books().await?))
}

pub async fn get_book(
    State(state): State<AppState>,
    Path(external_id): Path<i64>,
) -> AppResult<Json<Book>> {
    Ok(Json(state.inventory.get_book(external_id).await?))
}

pub async fn update_stock(
    State(state): State<AppState>,
    Path(external_id): Path<i64>,
    Query(update): Query<StockUpdate>,
) -> AppResult<Json<Book>> {
    Ok(Json(state.inventory.set_stock(external_id, update.stock_quantity).await?))
}

pub async fn get_user(State(state): State<AppState>, Path(id): Path<i64>) -> AppResult<Json<User>> {
    Ok(Json(state.users.get_by_id(id).await?))
}

pub async fn create_reservation(
    State(state): State<AppState>,
    Json(request): Json<CreateReservationRequest>,
) -> AppResult<(StatusCode, Json<ReservationView>)> {
    let period = RentalPeriod::new(request.start_date, request.rental_days)?;

    let view = state
        .reservations
        .create(request.user_id, request.book_external_id, period)
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn get_reservation(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<ReservationView>> {
    Ok(Json(state.reservations.get_by_id(id).await?))
}

pub async fn list_reservations(State(state): State<AppState>) -> AppResult<Json<Vec<ReservationView>>> {
    Ok(Json(state.reservations.list_all().await?))
}

pub async fn list_user_reservations(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> AppResult<Json<Vec<ReservationView>>> {
    Ok(Json(state.reservations.list_by_user(user_id).await?))
}

pub async fn list_active_reservations(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<ReservationView>>> {
    Ok(Json(state.reservations.list_active().await?))
}

pub async fn list_overdue_reservations(
    State(state): State<AppState>,
) -> AppResult<Json<Vec<ReservationView>>> {
    let today = Utc::now().date_naive();
    Ok(Json(state.reservations.list_overdue(today).await?))
}

pub async fn return_book(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<ReturnBookRequest>,
) -> AppResult<Json<ReservationView>> {
    Ok(Json(state.reservations.return_book(id, request.return_date).await?))
}
