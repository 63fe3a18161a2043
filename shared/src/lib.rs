//! Domain model for the library: books and their stock counters, users,
//! reservations with their fee arithmetic, and the error taxonomy shared by
//! every layer of the service.

pub mod book;
pub mod catalog;
pub mod error;
pub mod fees;
pub mod reservation;
pub mod user;

pub use book::Book;
pub use catalog::{ExternalBookRecord, SyncSummary};
pub use error::{LibraryError, Result};
pub use reservation::{
    close_reservation, open_reservation, NewReservation, RentalPeriod, Reservation,
    ReservationStatus, ReservationView, ReturnOutcome,
};
pub use user::User;
