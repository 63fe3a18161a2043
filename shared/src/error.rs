use crate::ReservationStatus;

pub type Result<T, E = LibraryError> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    #[error("{entity} not found with id {id}")]
    NotFound { entity: &'static str, id: i64 },

    #[error("no copies available for book {external_id} ({title})")]
    OutOfStock { external_id: i64, title: String },

    #[error("invalid stock {requested}: {reserved} copies are currently reserved")]
    InvalidStock { requested: i32, reserved: i32 },

    #[error("reservation {id} was already closed with status {status}")]
    AlreadyReturned { id: i64, status: ReservationStatus },

    #[error("external catalog error: {message}")]
    ExternalService {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation failed: {0}")]
    Validation(String),
}

impl LibraryError {
    pub fn book_not_found(external_id: i64) -> Self {
        Self::NotFound { entity: "Book", id: external_id }
    }

    pub fn user_not_found(id: i64) -> Self {
        Self::NotFound { entity: "User", id }
    }

    pub fn reservation_not_found(id: i64) -> Self {
        Self::NotFound { entity: "Reservation", id }
    }

    pub fn external<E>(message: impl Into<String>, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::ExternalService {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }
}
