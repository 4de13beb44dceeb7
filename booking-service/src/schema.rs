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
    customers (id) {
        id -> Uuid,
        user_id -> Nullable<Uuid>,
        full_name -> Varchar,
        email -> Varchar,
        phone -> Varchar,
        marketing_opt_in -> Bool,
        created_at -> Nullable<Timestamptz>,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    addresses (id) {
        id -> Uuid,
        customer_id -> Uuid,
        street -> Varchar,
        city -> Varchar,
        postal_code -> Varchar,
        notes -> Nullable<Text>,
        created_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    reservations (id) {
        id -> Uuid,
        order_number -> Varchar,
        customer_id -> Uuid,
        address_id -> Nullable<Uuid>,
        start_date -> Date,
        end_date -> Date,
        delivery_type -> Varchar,
        subtotal -> Numeric,
        delivery_fee -> Numeric,
        discount -> Numeric,
        total -> Numeric,
        deposit_amount -> Numeric,
        status -> Varchar,
        payment_status -> Varchar,
        deposit_status -> Varchar,
        deposit_refunded_at -> Nullable<Timestamptz>,
        notes -> Nullable<Text>,
        created_at -> Nullable<Timestamptz>,
        updated_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    reservation_items (id) {
        id -> Uuid,
        reservation_id -> Uuid,
        product_id -> Uuid,
        quantity -> Int4,
        duration_days -> Int4,
        unit_price -> Numeric,
        subtotal -> Numeric,
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

diesel::table! {
    fulfillment_tasks (id) {
        id -> Uuid,
        reservation_id -> Uuid,
        task_type -> Varchar,
        scheduled_date -> Date,
        status -> Varchar,
        snapshot -> Jsonb,
        created_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    outbox_events (id) {
        id -> Uuid,
        aggregate_id -> Uuid,
        event_type -> Varchar,
        event_data -> Jsonb,
        processed -> Nullable<Bool>,
        created_at -> Nullable<Timestamptz>,
    }
}

diesel::joinable!(addresses -> customers (customer_id));
diesel::joinable!(reservations -> customers (customer_id));
diesel::joinable!(reservation_items -> reservations (reservation_id));
diesel::joinable!(fulfillment_tasks -> reservations (reservation_id));

diesel::allow_tables_to_appear_in_same_query!(
    products,
    customers,
    addresses,
    reservations,
    reservation_items,
    availability_intervals,
    fulfillment_tasks,
    outbox_events,
);
