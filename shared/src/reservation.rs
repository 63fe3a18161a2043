use bigdecimal::BigDecimal;
use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::book::Book;
use crate::error::{LibraryError, Result};
use crate::fees;
use crate::user::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Active,
    Returned,
    Overdue,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Active => "ACTIVE",
            ReservationStatus::Returned => "RETURNED",
            ReservationStatus::Overdue => "OVERDUE",
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            ReservationStatus::Active => false,
            ReservationStatus::Returned | ReservationStatus::Overdue => true,
        }
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReservationStatus {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ACTIVE" => Ok(ReservationStatus::Active),
            "RETURNED" => Ok(ReservationStatus::Returned),
            "OVERDUE" => Ok(ReservationStatus::Overdue),
            other => Err(LibraryError::Conflict(format!(
                "unknown reservation status {other:?}"
            ))),
        }
    }
}

/// A validated rental window. Only constructible with a positive day count
/// and a representable return date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RentalPeriod {
    start_date: NaiveDate,
    rental_days: u32,
    expected_return_date: NaiveDate,
}

impl RentalPeriod {
    pub fn new(start_date: NaiveDate, rental_days: i32) -> Result<Self> {
        let days = u32::try_from(rental_days)
            .ok()
            .filter(|days| *days > 0)
            .ok_or_else(|| {
                LibraryError::Validation(format!(
                    "rental days must be a positive integer, got {rental_days}"
                ))
            })?;
        let expected_return_date = start_date
            .checked_add_days(Days::new(days.into()))
            .ok_or_else(|| {
                LibraryError::Validation(format!(
                    "return date out of range for {start_date} plus {days} days"
                ))
            })?;
        Ok(Self {
            start_date,
            rental_days: days,
            expected_return_date,
        })
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn rental_days(&self) -> u32 {
        self.rental_days
    }

    pub fn expected_return_date(&self) -> NaiveDate {
        self.expected_return_date
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reservation {
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
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
}

impl Reservation {
    /// Still out and past its expected return date as of `today`.
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.status == ReservationStatus::Active && self.expected_return_date < today
    }
}

/// A reservation that has been priced but not yet stored.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReservation {
    pub user_id: i64,
    pub book_external_id: i64,
    pub rental_days: i32,
    pub start_date: NaiveDate,
    pub expected_return_date: NaiveDate,
    pub daily_rate: BigDecimal,
    pub total_fee: BigDecimal,
    pub late_fee: BigDecimal,
    pub status: ReservationStatus,
}

/// Result of closing a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReturnOutcome {
    pub days_late: i64,
    pub status: ReservationStatus,
}

/// Prices a new reservation and takes one copy of `book`.
///
/// The daily rate is a snapshot of the current price; later price changes
/// never touch the stored total fee. On failure `book` is left unchanged.
pub fn open_reservation(user: &User, book: &mut Book, period: &RentalPeriod) -> Result<NewReservation> {
    if !book.is_available() {
        return Err(LibraryError::OutOfStock {
            external_id: book.external_id,
            title: book.title.clone(),
        });
    }

    let rental_days = i32::try_from(period.rental_days()).map_err(|_| {
        LibraryError::Validation(format!("rental days {} out of range", period.rental_days()))
    })?;
    let daily_rate = book.price.clone();
    let total_fee = fees::total_fee(&daily_rate, period.rental_days());

    book.take_copy()?;

    Ok(NewReservation {
        user_id: user.id,
        book_external_id: book.external_id,
        rental_days,
        start_date: period.start_date(),
        expected_return_date: period.expected_return_date(),
        daily_rate,
        total_fee,
        late_fee: fees::zero_fee(),
        status: ReservationStatus::Active,
    })
}

/// Closes an active reservation and puts its copy back on the shelf.
///
/// Late returns are charged on the book's price at return time, not on the
/// reservation's daily rate.
pub fn close_reservation(
    reservation: &mut Reservation,
    book: &mut Book,
    return_date: NaiveDate,
) -> Result<ReturnOutcome> {
    match reservation.status {
        ReservationStatus::Active => {}
        status @ (ReservationStatus::Returned | ReservationStatus::Overdue) => {
            return Err(LibraryError::AlreadyReturned {
                id: reservation.id,
                status,
            });
        }
    }
    if reservation.book_external_id != book.external_id {
        return Err(LibraryError::Conflict(format!(
            "reservation {} belongs to book {}, not {}",
            reservation.id, reservation.book_external_id, book.external_id
        )));
    }

    let days_late = (return_date - reservation.expected_return_date).num_days();
    let status = if days_late > 0 {
        reservation.late_fee = fees::late_fee(&book.price, days_late);
        ReservationStatus::Overdue
    } else {
        reservation.late_fee = fees::zero_fee();
        ReservationStatus::Returned
    };
    reservation.actual_return_date = Some(return_date);
    reservation.status = status;
    book.return_copy();

    Ok(ReturnOutcome {
        days_late: days_late.max(0),
        status,
    })
}

/// Reservation joined with the user's name and the book's title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationView {
    pub id: i64,
    pub user_id: i64,
    pub user_name: String,
    pub book_external_id: i64,
    pub book_title: String,
    pub rental_days: i32,
    pub start_date: NaiveDate,
    pub expected_return_date: NaiveDate,
    pub actual_return_date: Option<NaiveDate>,
    pub daily_rate: BigDecimal,
    pub total_fee: BigDecimal,
    pub late_fee: BigDecimal,
    pub status: ReservationStatus,
    pub created_at: DateTime<Utc>,
}

impl ReservationView {
    pub fn project(reservation: &Reservation, user: &User, book: &Book) -> Self {
        Self {
            id: reservation.id,
            user_id: user.id,
            user_name: user.name.clone(),
            book_external_id: book.external_id,
            book_title: book.title.clone(),
            rental_days: reservation.rental_days,
            start_date: reservation.start_date,
            expected_return_date: reservation.expected_return_date,
            actual_return_date: reservation.actual_return_date,
            daily_rate: reservation.daily_rate.clone(),
            total_fee: reservation.total_fee.clone(),
            late_fee: reservation.late_fee.clone(),
            status: reservation.status,
            created_at: reservation.created_at,
        }
    }
}
