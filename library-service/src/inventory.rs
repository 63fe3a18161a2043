use diesel::prelude::*;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use shared::{Book, ExternalBookRecord, LibraryError, SyncSummary};
use tracing::{info, warn};

use crate::catalog::CatalogClient;
use crate::error::{AppError, AppResult};
use crate::models::*;
use crate::schema::books;
use crate::DbPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted {
    Inserted,
    Updated,
}

#[derive(Clone)]
pub struct Inventory {
    pool: DbPool,
}

impl Inventory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn list_books(&self) -> AppResult<Vec<Book>> {
        let mut conn = self.pool.get().await?;
        let rows = books::table
            .select(BookRow::as_select())
            .order(books::external_id.asc())
            .load::<BookRow>(&mut conn)
            .await?;

        let books = rows
            .into_iter()
            .map(Book::try_from)
            .collect::<Result<Vec<_>, LibraryError>>()?;
        Ok(books)
    }

    pub async fn get_book(&self, external_id: i64) -> AppResult<Book> {
        let mut conn = self.pool.get().await?;
        find_book(&mut conn, external_id)
            .await?
            .ok_or_else(|| LibraryError::book_not_found(external_id).into())
    }

    pub async fn set_stock(&self, external_id: i64, new_stock: i32) -> AppResult<Book> {
        let mut conn = self.pool.get().await?;

        let book = conn
            .transaction::<_, AppError, _>(|conn| {
                Box::pin(async move {
                    let mut book = lock_book(conn, external_id).await?;
                    book.set_stock(new_stock)?;
                    save_book(conn, &book).await
                })
            })
            .await?;

        info!(
            "Stock for book {} set to {} ({} available)",
            external_id,
            book.stock_quantity(),
            book.available_quantity()
        );
        Ok(book)
    }

    /// Upserts every record in a single transaction.
    pub async fn upsert_records(&self, records: Vec<ExternalBookRecord>) -> AppResult<SyncSummary> {
        let mut conn = self.pool.get().await?;

        conn.transaction::<_, AppError, _>(|conn| {
            Box::pin(async move {
                let mut summary = SyncSummary {
                    fetched: records.len(),
                    ..SyncSummary::default()
                };
                for record in &records {
                    match upsert_record(conn, record).await? {
                        Upserted::Inserted => summary.inserted += 1,
                        Upserted::Updated => summary.updated += 1,
                    }
                }
                Ok(summary)
            })
        })
        .await
    }

    /// Pulls the whole upstream catalog into the inventory.
    pub async fn sync_catalog(&self, catalog: &CatalogClient) -> AppResult<SyncSummary> {
        let records = catalog.fetch_all().await?;
        let summary = self.upsert_records(records).await?;
        info!(
            "Catalog sync finished: {} fetched, {} inserted, {} updated",
            summary.fetched, summary.inserted, summary.updated
        );
        Ok(summary)
    }

    /// Refreshes one book from the upstream catalog.
    pub async fn sync_book(&self, catalog: &CatalogClient, external_id: i64) -> AppResult<Book> {
        let record = match catalog.fetch_by_id(external_id).await? {
            Some(record) => record,
            None => {
                warn!("Book {} is not present in the external catalog", external_id);
                return Err(LibraryError::book_not_found(external_id).into());
            }
        };
        if record.id != external_id {
            return Err(LibraryError::ExternalService {
                message: format!("catalog returned book {} when asked for {}", record.id, external_id),
                source: None,
            }
            .into());
        }

        let mut conn = self.pool.get().await?;
        let book = conn
            .transaction::<_, AppError, _>(|conn| {
                Box::pin(async move {
                    upsert_record(conn, &record).await?;
                    lock_book(conn, record.id).await
                })
            })
            .await?;

        info!("Book {} refreshed from external catalog", external_id);
        Ok(book)
    }
}

pub(crate) async fn find_book(conn: &mut AsyncPgConnection, external_id: i64) -> AppResult<Option<Book>> {
    let row = books::table
        .find(external_id)
        .select(BookRow::as_select())
        .first::<BookRow>(conn)
        .await
        .optional()?;

    Ok(row.map(Book::try_from).transpose()?)
}

/// Loads a book and holds its row lock until the surrounding transaction ends.
pub(crate) async fn lock_book(conn: &mut AsyncPgConnection, external_id: i64) -> AppResult<Book> {
    let row = books::table
        .find(external_id)
        .select(BookRow::as_select())
        .for_update()
        .first::<BookRow>(conn)
        .await
        .optional()?
        .ok_or_else(|| LibraryError::book_not_found(external_id))?;

    Ok(Book::try_from(row)?)
}

pub(crate) async fn save_book(conn: &mut AsyncPgConnection, book: &Book) -> AppResult<Book> {
    let row = diesel::update(books::table.find(book.external_id))
        .set(&BookChangeset::from(book))
        .returning(BookRow::as_returning())
        .get_result::<BookRow>(conn)
        .await?;

    Ok(Book::try_from(row)?)
}

/// Inserts a new book, or refreshes title, price and stock of an existing one.
pub(crate) async fn upsert_record(conn: &mut AsyncPgConnection, record: &ExternalBookRecord) -> AppResult<Upserted> {
    let fresh = Book::from_record(record).map_err(|e| malformed_record(record, e))?;

    let inserted = diesel::insert_into(books::table)
        .values(&NewBookRow::from(&fresh))
        .on_conflict(books::external_id)
        .do_nothing()
        .execute(conn)
        .await?;
    if inserted > 0 {
        return Ok(Upserted::Inserted);
    }

    let mut book = lock_book(conn, record.id).await?;
    book.refresh_from(record).map_err(|e| malformed_record(record, e))?;
    save_book(conn, &book).await?;
    Ok(Upserted::Updated)
}

/// Bad upstream data is a catalog fault, not a client error.
fn malformed_record(record: &ExternalBookRecord, err: LibraryError) -> LibraryError {
    warn!("Rejecting catalog record for book {}: {}", record.id, err);
    LibraryError::external(format!("malformed catalog record for book {}", record.id), err)
}
