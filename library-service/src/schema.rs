diesel::table! {
    books (external_id) {
        external_id -> Int8,
        title -> Varchar,
        price -> Numeric,
        stock_quantity -> Int4,
        available_quantity -> Int4,
        created_at -> Nullable<Timestamptz>,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    users (id) {
        id -> Int8,
        name -> Varchar,
        email -> Varchar,
        created_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    reservations (id) {
        id -> Int8,
        user_id -> Int8,
        book_external_id -> Int8,
        rental_days -> Int4,
        start_date -> Date,
        expected_return_date -> Date,
        actual_return_date -> Nullable<Date>,
        daily_rate -> Numeric,
        total_fee -> Numeric,
        late_fee -> Numeric,
        status -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(reservations -> books (book_external_id));
diesel::joinable!(reservations -> users (user_id));

diesel::allow_tables_to_appear_in_same_query!(
    books,
    reservations,
    users,
);
