use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use shared::{LibraryError, User};

use crate::error::AppResult;
use crate::models::UserRow;
use crate::schema::users;
use crate::DbPool;

/// Read-only lookup of library users.
#[derive(Clone)]
pub struct UserDirectory {
    pool: DbPool,
}

impl UserDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: i64) -> AppResult<User> {
        let mut conn = self.pool.get().await?;
        find_user(&mut conn, id).await
    }
}

pub(crate) async fn find_user(conn: &mut AsyncPgConnection, id: i64) -> AppResult<User> {
    let row = users::table
        .find(id)
        .select(UserRow::as_select())
        .first::<UserRow>(conn)
        .await
        .optional()?
        .ok_or_else(|| LibraryError::user_not_found(id))?;

    Ok(User::from(row))
}
