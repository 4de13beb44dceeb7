diesel::table! {
    products (id) {
        id -> Uuid,
        name -> Varchar,
        total_stock -> Int4,
        is_active -> Bool,
        created_at -> Nullable<Timestamptz>,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    reservations (id) {
        id -> Uuid,
        status -> Varchar,
    }
}

diesel::table! {
    availability_intervals (id) {
        id -> Uuid,
        product_id -> Uuid,
        reservation_id -> Nullable<Uuid>,
        start_date -> Date,
        end_date -> Date,
        quantity -> Int4,
        status -> Varchar,
        note -> Nullable<Text>,
        created_at -> Nullable<Timestamptz>,
    }
}

diesel::joinable!(availability_intervals -> products (product_id));

diesel::allow_tables_to_appear_in_same_query!(
    products,
    reservations,
    availability_intervals,
);
