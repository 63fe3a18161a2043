use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use shared::{Book, LibraryError, NewReservation, Reservation, User};

use crate::schema::{books, reservations, users};

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = books)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct BookRow {
    pub external_id: i64,
    pub title: String,
    pub price: BigDecimal,
    pub stock_quantity: i32,
    pub available_quantity: i32,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = books)]
pub struct NewBookRow {
    pub external_id: i64,
    pub title: String,
    pub price: BigDecimal,
    pub stock_quantity: i32,
    pub available_quantity: i32,
}

#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = books)]
pub struct BookChangeset {
    pub title: String,
    pub price: BigDecimal,
    pub stock_quantity: i32,
    pub available_quantity: i32,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserRow {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = reservations)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ReservationRow {
    pub id: i64,
    pub user_id: i64,
    pub book_external_id: i64,
    pub rental_days: i32,
    pub start_date: NaiveDate,
    pub expected_return_date: NaiveDate,
    pub actual_return_date: Option<NaiveDate>,
    pub daily_rate: BigDecimal,
    pub total_fee: BigDecimal,
    pub late_fee: BigDecimal,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = reservations)]
pub struct NewReservationRow {
    pub user_id: i64,
    pub book_external_id: i64,
    pub rental_days: i32,
    pub start_date: NaiveDate,
    pub expected_return_date: NaiveDate,
    pub daily_rate: BigDecimal,
    pub total_fee: BigDecimal,
    pub late_fee: BigDecimal,
    pub status: String,
}

/// Columns written when a reservation is closed.
#[derive(Debug, Clone, AsChangeset)]
#[diesel(table_name = reservations)]
#[diesel(treat_none_as_null = true)]
pub struct ReservationReturnChangeset {
    pub actual_return_date: Option<NaiveDate>,
    pub late_fee: BigDecimal,
    pub status: String,
}

impl TryFrom<BookRow> for Book {
    type Error = LibraryError;

    fn try_from(row: BookRow) -> Result<Self, Self::Error> {
        Book::restore(
            row.external_id,
            row.title,
            row.price,
            row.stock_quantity,
            row.available_quantity,
            row.created_at,
            row.updated_at,
        )
    }
}

impl From<&Book> for NewBookRow {
    fn from(book: &Book) -> Self {
        Self {
            external_id: book.external_id,
            title: book.title.clone(),
            price: book.price.clone(),
            stock_quantity: book.stock_quantity(),
            available_quantity: book.available_quantity(),
        }
    }
}

impl From<&Book> for BookChangeset {
    fn from(book: &Book) -> Self {
        Self {
            title: book.title.clone(),
            price: book.price.clone(),
            stock_quantity: book.stock_quantity(),
            available_quantity: book.available_quantity(),
            updated_at: Some(Utc::now()),
        }
    }
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            email: row.email,
            created_at: row.created_at,
        }
    }
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = LibraryError;

    fn try_from(row: ReservationRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            book_external_id: row.book_external_id,
            rental_days: row.rental_days,
            start_date: row.start_date,
            expected_return_date: row.expected_return_date,
            actual_return_date: row.actual_return_date,
            daily_rate: row.daily_rate,
            total_fee: row.total_fee,
            late_fee: row.late_fee,
            status: row.status.parse()?,
            created_at: row.created_at,
        })
    }
}

impl From<&NewReservation> for NewReservationRow {
    fn from(draft: &NewReservation) -> Self {
        Self {
            user_id: draft.user_id,
            book_external_id: draft.book_external_id,
            rental_days: draft.rental_days,
            start_date: draft.start_date,
            expected_return_date: draft.expected_return_date,
            daily_rate: draft.daily_rate.clone(),
            total_fee: draft.total_fee.clone(),
            late_fee: draft.late_fee.clone(),
            status: draft.status.as_str().to_string(),
        }
    }
}

impl From<&Reservation> for ReservationReturnChangeset {
    fn from(reservation: &Reservation) -> Self {
        Self {
            actual_return_date: reservation.actual_return_date,
            late_fee: reservation.late_fee.clone(),
            status: reservation.status.as_str().to_string(),
        }
    }
}
