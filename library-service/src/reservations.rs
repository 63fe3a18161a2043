use chrono::NaiveDate;
use diesel::prelude::*;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use shared::*;
use std::collections::{BTreeSet, HashMap};
use tracing::info;

use crate::directory::find_user;
use crate::error::{AppError, AppResult};
use crate::inventory::{lock_book, save_book};
use crate::models::*;
use crate::schema::{books, reservations, users};
use crate::DbPool;

enum ReservationFilter {
    All,
    ByUser(i64),
    Active,
    OverdueAsOf(NaiveDate),
}

/// Creates and closes reservations, keeping book availability in step.
///
/// Each mutation runs in one transaction holding the book's row lock, so
/// two requests for the last copy cannot both succeed.
#[derive(Clone)]
pub struct ReservationEngine {
    pool: DbPool,
}

impl ReservationEngine {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create(
        &self,
        user_id: i64,
        book_external_id: i64,
        period: RentalPeriod,
    ) -> AppResult<ReservationView> {
        let mut conn = self.pool.get().await?;

        let view = conn
            .transaction::<_, AppError, _>(|conn| {
                Box::pin(async move {
                    let user = find_user(conn, user_id).await?;
                    let mut book = lock_book(conn, book_external_id).await?;
                    let draft = open_reservation(&user, &mut book, &period)?;

                    let row = diesel::insert_into(reservations::table)
                        .values(&NewReservationRow::from(&draft))
                        .returning(ReservationRow::as_returning())
                        .get_result::<ReservationRow>(conn)
                        .await?;
                    let reservation = Reservation::try_from(row)?;
                    let book = save_book(conn, &book).await?;

                    Ok(ReservationView::project(&reservation, &user, &book))
                })
            })
            .await?;

        info!(
            "Created reservation {} for user {} and book {} (total fee {})",
            view.id, view.user_name, view.book_title, view.total_fee
        );
        Ok(view)
    }

    pub async fn return_book(&self, reservation_id: i64, return_date: NaiveDate) -> AppResult<ReservationView> {
        let mut conn = self.pool.get().await?;

        let (view, outcome) = conn
            .transaction::<_, AppError, _>(|conn| {
                Box::pin(async move {
                    let row = reservations::table
                        .find(reservation_id)
                        .select(ReservationRow::as_select())
                        .for_update()
                        .first::<ReservationRow>(conn)
                        .await
                        .optional()?
                        .ok_or_else(|| LibraryError::reservation_not_found(reservation_id))?;
                    let mut reservation = Reservation::try_from(row)?;
                    if reservation.status.is_terminal() {
                        return Err(LibraryError::AlreadyReturned {
                            id: reservation.id,
                            status: reservation.status,
                        }
                        .into());
                    }

                    let mut book = lock_book(conn, reservation.book_external_id).await?;
                    let user = find_user(conn, reservation.user_id).await?;
                    let outcome = close_reservation(&mut reservation, &mut book, return_date)?;

                    diesel::update(reservations::table.find(reservation.id))
                        .set(&ReservationReturnChangeset::from(&reservation))
                        .execute(conn)
                        .await?;
                    let book = save_book(conn, &book).await?;

                    Ok((ReservationView::project(&reservation, &user, &book), outcome))
                })
            })
            .await?;

        if outcome.days_late > 0 {
            info!(
                "Reservation {} returned {} days late, late fee {}",
                view.id, outcome.days_late, view.late_fee
            );
        } else {
            info!("Reservation {} returned on time", view.id);
        }
        Ok(view)
    }

    pub async fn get_by_id(&self, reservation_id: i64) -> AppResult<ReservationView> {
        let mut conn = self.pool.get().await?;
        let row = reservations::table
            .find(reservation_id)
            .select(ReservationRow::as_select())
            .first::<ReservationRow>(&mut conn)
            .await
            .optional()?
            .ok_or_else(|| LibraryError::reservation_not_found(reservation_id))?;

        let mut views = project_rows(&mut conn, vec![row]).await?;
        views
            .pop()
            .ok_or_else(|| LibraryError::reservation_not_found(reservation_id).into())
    }

    pub async fn list_all(&self) -> AppResult<Vec<ReservationView>> {
        self.list(ReservationFilter::All).await
    }

    pub async fn list_by_user(&self, user_id: i64) -> AppResult<Vec<ReservationView>> {
        self.list(ReservationFilter::ByUser(user_id)).await
    }

    pub async fn list_active(&self) -> AppResult<Vec<ReservationView>> {
        self.list(ReservationFilter::Active).await
    }

    /// Active reservations whose expected return date is strictly before `today`.
    pub async fn list_overdue(&self, today: NaiveDate) -> AppResult<Vec<ReservationView>> {
        self.list(ReservationFilter::OverdueAsOf(today)).await
    }

    async fn list(&self, filter: ReservationFilter) -> AppResult<Vec<ReservationView>> {
        let mut conn = self.pool.get().await?;
        let active = ReservationStatus::Active.as_str();

        let mut query = reservations::table
            .select(ReservationRow::as_select())
            .into_boxed();
        query = match filter {
            ReservationFilter::All => query,
            ReservationFilter::ByUser(user_id) => query.filter(reservations::user_id.eq(user_id)),
            ReservationFilter::Active => query.filter(reservations::status.eq(active)),
            ReservationFilter::OverdueAsOf(today) => query
                .filter(reservations::status.eq(active))
                .filter(reservations::expected_return_date.lt(today)),
        };

        let rows = query
            .order(reservations::id.asc())
            .load::<ReservationRow>(&mut conn)
            .await?;
        project_rows(&mut conn, rows).await
    }
}

/// Joins reservation rows with their users and books into views.
async fn project_rows(conn: &mut AsyncPgConnection, rows: Vec<ReservationRow>) -> AppResult<Vec<ReservationView>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let user_ids: Vec<i64> = rows
        .iter()
        .map(|row| row.user_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let book_ids: Vec<i64> = rows
        .iter()
        .map(|row| row.book_external_id)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let users: HashMap<i64, User> = users::table
        .filter(users::id.eq_any(user_ids))
        .select(UserRow::as_select())
        .load::<UserRow>(conn)
        .await?
        .into_iter()
        .map(|row| (row.id, User::from(row)))
        .collect();

    let books: HashMap<i64, Book> = books::table
        .filter(books::external_id.eq_any(book_ids))
        .select(BookRow::as_select())
        .load::<BookRow>(conn)
        .await?
        .into_iter()
        .map(|row| Book::try_from(row).map(|book| (book.external_id, book)))
        .collect::<Result<_, LibraryError>>()?;

    rows.into_iter()
        .map(|row| -> AppResult<ReservationView> {
            let reservation = Reservation::try_from(row)?;
            let user = users
                .get(&reservation.user_id)
                .ok_or_else(|| LibraryError::user_not_found(reservation.user_id))?;
            let book = books
                .get(&reservation.book_external_id)
                .ok_or_else(|| LibraryError::book_not_found(reservation.book_external_id))?;
            Ok(ReservationView::project(&reservation, user, book))
        })
        .collect()
}
