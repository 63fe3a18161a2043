//! Engine tests against a real PostgreSQL database.
//!
//! Run with `TEST_DATABASE_URL=postgres://... cargo test -- --ignored`.

use assert_matches::assert_matches;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use bigdecimal::BigDecimal;
use chrono::{Days, NaiveDate, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;
use library_service::catalog::CatalogClient;
use library_service::error::AppError;
use library_service::inventory::Inventory;
use library_service::reservations::ReservationEngine;
use library_service::schema::users;
use library_service::DbPool;
use serde_json::{json, Value};
use shared::{ExternalBookRecord, LibraryError, RentalPeriod, ReservationStatus};
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

static NEXT_ID: AtomicI64 = AtomicI64::new(0);
static MIGRATE: Once = Once::new();

fn unique_id() -> i64 {
    let base = Utc::now().timestamp_micros() * 100;
    base + NEXT_ID.fetch_add(1, Ordering::SeqCst)
}

async fn pool() -> DbPool {
    let url = std::env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set");
    let migrate_url = url.clone();
    tokio::task::spawn_blocking(move || {
        MIGRATE.call_once(|| library_service::run_migrations(&migrate_url).unwrap())
    })
    .await
    .unwrap();
    library_service::connect_pool(&url, 8).await.unwrap()
}

async fn insert_user(pool: &DbPool, name: &str) -> i64 {
    let mut conn = pool.get().await.unwrap();
    let email = format!("{}-{}@example.com", name.to_lowercase(), unique_id());
    diesel::insert_into(users::table)
        .values((users::name.eq(name), users::email.eq(email)))
        .returning(users::id)
        .get_result::<i64>(&mut conn)
        .await
        .unwrap()
}

fn record(id: i64, price: &str, stock: i32) -> ExternalBookRecord {
    ExternalBookRecord {
        id,
        title: format!("Book {id}"),
        price: BigDecimal::from_str(price).unwrap(),
        stock_quantity: stock,
    }
}

/// In-process upstream catalog whose contents a test can swap between syncs.
#[derive(Clone, Default)]
struct StubCatalog {
    books: Arc<Mutex<Vec<Value>>>,
}

impl StubCatalog {
    fn set(&self, books: Vec<Value>) {
        *self.books.lock().unwrap() = books;
    }
}

fn catalog_book(id: i64, price: &str, stock: i32) -> Value {
    json!({"id": id, "title": format!("Book {id}"), "price": price, "stock": stock})
}

async fn all_books(State(stub): State<StubCatalog>) -> Json<Value> {
    Json(Value::Array(stub.books.lock().unwrap().clone()))
}

async fn one_book(State(stub): State<StubCatalog>, Path(id): Path<i64>) -> Response {
    let found = stub.books.lock().unwrap().iter().find(|b| b["id"] == id).cloned();
    match found {
        Some(book) => Json(book).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn serve_catalog(stub: StubCatalog) -> String {
    let router = Router::new()
        .route("/books", get(all_books))
        .route("/books/:id", get(one_book))
        .route("/broken", get(|| async { StatusCode::SERVICE_UNAVAILABLE }))
        .route("/broken/:id", get(|| async { StatusCode::SERVICE_UNAVAILABLE }))
        .route(
            "/mismatched/:id",
            get(|Path(id): Path<i64>| async move { Json(catalog_book(id + 1, "1.00", 1)) }),
        )
        .with_state(stub);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

fn catalog_client(base: &str, path: &str) -> CatalogClient {
    CatalogClient::new(format!("{base}{path}"), Duration::from_secs(2)).unwrap()
}

fn dec(s: &str) -> BigDecimal {
    BigDecimal::from_str(s).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn week_from(start: NaiveDate) -> RentalPeriod {
    RentalPeriod::new(start, 7).unwrap()
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn create_then_return_on_time() {
    let pool = pool().await;
    let inventory = Inventory::new(pool.clone());
    let engine = ReservationEngine::new(pool.clone());
    let user_id = insert_user(&pool, "Juan").await;
    let book_id = unique_id();
    inventory.upsert_records(vec![record(book_id, "15.99", 2)]).await.unwrap();

    let view = engine.create(user_id, book_id, week_from(date(2024, 3, 1))).await.unwrap();
    assert_eq!(view.status, ReservationStatus::Active);
    assert_eq!(view.expected_return_date, date(2024, 3, 8));
    assert_eq!(view.daily_rate, dec("15.99"));
    assert_eq!(view.total_fee, dec("111.93"));
    assert_eq!(view.late_fee, dec("0"));
    assert_eq!(view.user_name, "Juan");
    assert_eq!(inventory.get_book(book_id).await.unwrap().available_quantity(), 1);

    let returned = engine.return_book(view.id, date(2024, 3, 8)).await.unwrap();
    assert_eq!(returned.status, ReservationStatus::Returned);
    assert_eq!(returned.actual_return_date, Some(date(2024, 3, 8)));
    assert_eq!(returned.late_fee, dec("0"));
    assert_eq!(inventory.get_book(book_id).await.unwrap().available_quantity(), 2);

    assert_eq!(engine.get_by_id(view.id).await.unwrap(), returned);
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn late_return_is_charged_on_current_price() {
    let pool = pool().await;
    let inventory = Inventory::new(pool.clone());
    let engine = ReservationEngine::new(pool.clone());
    let user_id = insert_user(&pool, "Ana").await;
    let book_id = unique_id();
    inventory.upsert_records(vec![record(book_id, "15.99", 1)]).await.unwrap();

    let view = engine.create(user_id, book_id, week_from(date(2024, 3, 1))).await.unwrap();
    let summary = inventory.upsert_records(vec![record(book_id, "20.00", 1)]).await.unwrap();
    assert_eq!((summary.inserted, summary.updated), (0, 1));

    let returned = engine.return_book(view.id, date(2024, 3, 10)).await.unwrap();
    assert_eq!(returned.status, ReservationStatus::Overdue);
    assert_eq!(returned.late_fee, dec("6.00"));
    assert_eq!(returned.total_fee, dec("111.93"));
    assert_eq!(returned.daily_rate, dec("15.99"));
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn last_copy_cannot_be_reserved_twice() {
    let pool = pool().await;
    let inventory = Inventory::new(pool.clone());
    let engine = ReservationEngine::new(pool.clone());
    let user_id = insert_user(&pool, "Luis").await;
    let book_id = unique_id();
    inventory.upsert_records(vec![record(book_id, "3.00", 1)]).await.unwrap();

    engine.create(user_id, book_id, week_from(date(2024, 5, 1))).await.unwrap();
    let err = engine.create(user_id, book_id, week_from(date(2024, 5, 2))).await.unwrap_err();
    assert_matches!(err, AppError::Library(LibraryError::OutOfStock { .. }));

    let book = inventory.get_book(book_id).await.unwrap();
    assert_eq!((book.stock_quantity(), book.available_quantity()), (1, 0));
    assert_eq!(engine.list_by_user(user_id).await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires TEST_DATABASE_URL"]
async fn concurrent_creates_take_the_last_copy_once() {
    let pool = pool().await;
    let inventory = Inventory::new(pool.clone());
    let engine = ReservationEngine::new(pool.clone());
    let user_id = insert_user(&pool, "Marta").await;
    let book_id = unique_id();
    inventory.upsert_records(vec![record(book_id, "5.00", 1)]).await.unwrap();

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.create(user_id, book_id, week_from(date(2024, 6, 1))).await })
        })
        .collect();

    let mut created = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => created += 1,
            Err(err) => assert_matches!(err, AppError::Library(LibraryError::OutOfStock { .. })),
        }
    }
    assert_eq!(created, 1);
    assert_eq!(inventory.get_book(book_id).await.unwrap().available_quantity(), 0);
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn second_return_is_rejected_without_side_effects() {
    let pool = pool().await;
    let inventory = Inventory::new(pool.clone());
    let engine = ReservationEngine::new(pool.clone());
    let user_id = insert_user(&pool, "Pedro").await;
    let book_id = unique_id();
    inventory.upsert_records(vec![record(book_id, "15.99", 3)]).await.unwrap();

    let view = engine.create(user_id, book_id, week_from(date(2024, 3, 1))).await.unwrap();
    let first = engine.return_book(view.id, date(2024, 3, 11)).await.unwrap();
    let available = inventory.get_book(book_id).await.unwrap().available_quantity();

    let err = engine.return_book(view.id, date(2024, 3, 12)).await.unwrap_err();
    assert_matches!(
        err,
        AppError::Library(LibraryError::AlreadyReturned { status: ReservationStatus::Overdue, .. })
    );
    assert_eq!(engine.get_by_id(view.id).await.unwrap(), first);
    assert_eq!(inventory.get_book(book_id).await.unwrap().available_quantity(), available);
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn missing_entities_are_not_found() {
    let pool = pool().await;
    let inventory = Inventory::new(pool.clone());
    let engine = ReservationEngine::new(pool.clone());
    let user_id = insert_user(&pool, "Rosa").await;
    let book_id = unique_id();
    inventory.upsert_records(vec![record(book_id, "1.00", 1)]).await.unwrap();

    let err = engine.create(-1, book_id, week_from(date(2024, 1, 1))).await.unwrap_err();
    assert_matches!(err, AppError::Library(LibraryError::NotFound { entity: "User", .. }));
    let err = engine.create(user_id, -1, week_from(date(2024, 1, 1))).await.unwrap_err();
    assert_matches!(err, AppError::Library(LibraryError::NotFound { entity: "Book", .. }));
    let err = engine.return_book(-1, date(2024, 1, 1)).await.unwrap_err();
    assert_matches!(err, AppError::Library(LibraryError::NotFound { entity: "Reservation", .. }));
    let err = inventory.get_book(-1).await.unwrap_err();
    assert_matches!(err, AppError::Library(LibraryError::NotFound { entity: "Book", id: -1 }));
    let err = inventory.set_stock(-1, 5).await.unwrap_err();
    assert_matches!(err, AppError::Library(LibraryError::NotFound { entity: "Book", id: -1 }));
    assert_eq!(inventory.get_book(book_id).await.unwrap().available_quantity(), 1);
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn set_stock_respects_reserved_copies() {
    let pool = pool().await;
    let inventory = Inventory::new(pool.clone());
    let engine = ReservationEngine::new(pool.clone());
    let user_id = insert_user(&pool, "Eva").await;
    let book_id = unique_id();
    inventory.upsert_records(vec![record(book_id, "2.00", 10)]).await.unwrap();
    for day in 1..=5 {
        engine.create(user_id, book_id, week_from(date(2024, 7, day))).await.unwrap();
    }

    let err = inventory.set_stock(book_id, 3).await.unwrap_err();
    assert_matches!(
        err,
        AppError::Library(LibraryError::InvalidStock { requested: 3, reserved: 5 })
    );

    let book = inventory.set_stock(book_id, 5).await.unwrap();
    assert_eq!((book.stock_quantity(), book.available_quantity()), (5, 0));
    let book = inventory.set_stock(book_id, 8).await.unwrap();
    assert_eq!((book.stock_quantity(), book.available_quantity()), (8, 3));
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn overdue_listing_is_computed_at_query_time() {
    let pool = pool().await;
    let inventory = Inventory::new(pool.clone());
    let engine = ReservationEngine::new(pool.clone());
    let user_id = insert_user(&pool, "Olga").await;
    let book_id = unique_id();
    inventory.upsert_records(vec![record(book_id, "4.00", 2)]).await.unwrap();

    let today = Utc::now().date_naive();
    let start = today.checked_sub_days(Days::new(10)).unwrap();
    let late = engine.create(user_id, book_id, week_from(start)).await.unwrap();
    let current = engine.create(user_id, book_id, week_from(today)).await.unwrap();

    let overdue: Vec<i64> = engine.list_overdue(today).await.unwrap().iter().map(|v| v.id).collect();
    assert!(overdue.contains(&late.id));
    assert!(!overdue.contains(&current.id));

    let active: Vec<i64> = engine.list_active().await.unwrap().iter().map(|v| v.id).collect();
    assert!(active.contains(&late.id) && active.contains(&current.id));

    engine.return_book(late.id, today).await.unwrap();
    let overdue: Vec<i64> = engine.list_overdue(today).await.unwrap().iter().map(|v| v.id).collect();
    assert!(!overdue.contains(&late.id));

    let mine = engine.list_by_user(user_id).await.unwrap();
    assert_eq!(mine.len(), 2);
    assert!(engine.list_all().await.unwrap().len() >= 2);
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn catalog_sync_inserts_then_refreshes_without_touching_reservations() {
    let pool = pool().await;
    let inventory = Inventory::new(pool.clone());
    let engine = ReservationEngine::new(pool.clone());
    let user_id = insert_user(&pool, "Nora").await;
    let (first, second) = (unique_id(), unique_id());

    let stub = StubCatalog::default();
    stub.set(vec![catalog_book(first, "15.99", 3), catalog_book(second, "8.00", 1)]);
    let base = serve_catalog(stub.clone()).await;
    let catalog = catalog_client(&base, "/books");

    let summary = inventory.sync_catalog(&catalog).await.unwrap();
    assert_eq!((summary.fetched, summary.inserted, summary.updated), (2, 2, 0));
    engine.create(user_id, first, week_from(date(2024, 8, 1))).await.unwrap();

    stub.set(vec![catalog_book(first, "20.00", 5), catalog_book(second, "8.00", 1)]);
    let summary = inventory.sync_catalog(&catalog).await.unwrap();
    assert_eq!((summary.fetched, summary.inserted, summary.updated), (2, 0, 2));

    let book = inventory.get_book(first).await.unwrap();
    assert_eq!(book.price, dec("20.00"));
    assert_eq!((book.stock_quantity(), book.available_quantity()), (5, 2));
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn sync_book_refreshes_a_single_title() {
    let pool = pool().await;
    let inventory = Inventory::new(pool.clone());
    let book_id = unique_id();

    let stub = StubCatalog::default();
    stub.set(vec![catalog_book(book_id, "4.50", 2)]);
    let base = serve_catalog(stub.clone()).await;
    let catalog = catalog_client(&base, "/books");

    let book = inventory.sync_book(&catalog, book_id).await.unwrap();
    assert_eq!((book.external_id, book.stock_quantity(), book.available_quantity()), (book_id, 2, 2));

    stub.set(vec![catalog_book(book_id, "4.50", 6)]);
    let book = inventory.sync_book(&catalog, book_id).await.unwrap();
    assert_eq!(book.stock_quantity(), 6);
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn sync_book_absent_upstream_is_not_found() {
    let pool = pool().await;
    let inventory = Inventory::new(pool.clone());
    let book_id = unique_id();
    let base = serve_catalog(StubCatalog::default()).await;

    let err = inventory.sync_book(&catalog_client(&base, "/books"), book_id).await.unwrap_err();
    assert_matches!(err, AppError::Library(LibraryError::NotFound { entity: "Book", .. }));
    assert_matches!(
        inventory.get_book(book_id).await,
        Err(AppError::Library(LibraryError::NotFound { .. }))
    );

    let err = inventory.sync_book(&catalog_client(&base, "/mismatched"), book_id).await.unwrap_err();
    assert_matches!(err, AppError::Library(LibraryError::ExternalService { .. }));
    assert_matches!(
        inventory.get_book(book_id).await,
        Err(AppError::Library(LibraryError::NotFound { .. }))
    );
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn failing_catalog_leaves_inventory_unchanged() {
    let pool = pool().await;
    let inventory = Inventory::new(pool.clone());
    let book_id = unique_id();
    inventory.upsert_records(vec![record(book_id, "3.00", 4)]).await.unwrap();
    let before = inventory.get_book(book_id).await.unwrap();

    let base = serve_catalog(StubCatalog::default()).await;
    let broken = catalog_client(&base, "/broken");

    let err = inventory.sync_catalog(&broken).await.unwrap_err();
    assert_matches!(err, AppError::Library(LibraryError::ExternalService { .. }));
    let err = inventory.sync_book(&broken, book_id).await.unwrap_err();
    assert_matches!(err, AppError::Library(LibraryError::ExternalService { .. }));

    assert_eq!(inventory.get_book(book_id).await.unwrap(), before);
}

#[tokio::test]
#[ignore = "requires TEST_DATABASE_URL"]
async fn malformed_catalog_record_rolls_back_the_whole_sync() {
    let pool = pool().await;
    let inventory = Inventory::new(pool.clone());
    let (good, bad) = (unique_id(), unique_id());

    let stub = StubCatalog::default();
    stub.set(vec![catalog_book(good, "5.00", 1), catalog_book(bad, "-5.00", 1)]);
    let base = serve_catalog(stub).await;

    let err = inventory.sync_catalog(&catalog_client(&base, "/books")).await.unwrap_err();
    assert_matches!(err, AppError::Library(LibraryError::ExternalService { .. }));
    assert_eq!(err.status_and_code().0, StatusCode::BAD_GATEWAY);

    for id in [good, bad] {
        assert_matches!(
            inventory.get_book(id).await,
            Err(AppError::Library(LibraryError::NotFound { .. }))
        );
    }
}
