use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use num_traits::Zero;
use serde::Serialize;

use crate::catalog::ExternalBookRecord;
use crate::error::{LibraryError, Result};
use crate::fees;

/// A catalog title together with its stock counters.
///
/// `available_quantity` only moves through [`Book::take_copy`],
/// [`Book::return_copy`] and [`Book::set_stock`], which keep
/// `0 <= available_quantity <= stock_quantity`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Book {
    pub external_id: i64,
    pub title: String,
    pub price: BigDecimal,
    stock_quantity: i32,
    available_quantity: i32,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Book {
    /// A freshly synced book: every copy starts out available.
    pub fn from_record(record: &ExternalBookRecord) -> Result<Self> {
        let stock = checked_stock(record.stock_quantity)?;
        let price = checked_price(record.id, &record.price)?;
        Ok(Self {
            external_id: record.id,
            title: record.title.clone(),
            price,
            stock_quantity: stock,
            available_quantity: stock,
            created_at: None,
            updated_at: None,
        })
    }

    /// Rebuilds a book from stored counters, rejecting rows that break the stock invariant.
    pub fn restore(
        external_id: i64,
        title: String,
        price: BigDecimal,
        stock_quantity: i32,
        available_quantity: i32,
        created_at: Option<DateTime<Utc>>,
        updated_at: Option<DateTime<Utc>>,
    ) -> Result<Self> {
        if stock_quantity < 0 || available_quantity < 0 || available_quantity > stock_quantity {
            return Err(LibraryError::Conflict(format!(
                "book {} has inconsistent stock: {} available of {}",
                external_id, available_quantity, stock_quantity
            )));
        }
        if price < BigDecimal::zero() {
            return Err(LibraryError::Conflict(format!(
                "book {} has negative price {}",
                external_id, price
            )));
        }
        Ok(Self {
            external_id,
            title,
            price,
            stock_quantity,
            available_quantity,
            created_at,
            updated_at,
        })
    }

    pub fn stock_quantity(&self) -> i32 {
        self.stock_quantity
    }

    pub fn available_quantity(&self) -> i32 {
        self.available_quantity
    }

    /// Copies currently held by active reservations.
    pub fn reserved_quantity(&self) -> i32 {
        self.stock_quantity - self.available_quantity
    }

    pub fn is_available(&self) -> bool {
        self.available_quantity > 0
    }

    /// Applies a catalog refresh. Title, price and stock follow the record;
    /// the available counter is kept, only clamped so it never exceeds the new stock.
    pub fn refresh_from(&mut self, record: &ExternalBookRecord) -> Result<()> {
        let stock = checked_stock(record.stock_quantity)?;
        let price = checked_price(self.external_id, &record.price)?;
        self.title = record.title.clone();
        self.price = price;
        self.stock_quantity = stock;
        self.available_quantity = self.available_quantity.min(stock);
        Ok(())
    }

    /// Changes the stock while keeping the reserved copies reserved.
    pub fn set_stock(&mut self, new_stock: i32) -> Result<()> {
        let reserved = self.reserved_quantity();
        if new_stock < 0 || new_stock < reserved {
            return Err(LibraryError::InvalidStock {
                requested: new_stock,
                reserved,
            });
        }
        self.available_quantity += new_stock - self.stock_quantity;
        self.stock_quantity = new_stock;
        Ok(())
    }

    pub fn take_copy(&mut self) -> Result<()> {
        if self.available_quantity <= 0 {
            return Err(LibraryError::Conflict(format!(
                "book {} has no copies left to take",
                self.external_id
            )));
        }
        self.available_quantity -= 1;
        Ok(())
    }

    pub fn return_copy(&mut self) {
        self.available_quantity = (self.available_quantity + 1).min(self.stock_quantity);
    }
}

fn checked_stock(stock: i32) -> Result<i32> {
    if stock < 0 {
        return Err(LibraryError::InvalidStock {
            requested: stock,
            reserved: 0,
        });
    }
    Ok(stock)
}

fn checked_price(external_id: i64, price: &BigDecimal) -> Result<BigDecimal> {
    let price = fees::round_money(price);
    if price < BigDecimal::zero() {
        return Err(LibraryError::Validation(format!(
            "book {} has negative price {}",
            external_id, price
        )));
    }
    Ok(price)
}
