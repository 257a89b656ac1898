use actix_web::web;

pub mod routes {
    pub mod events;
    pub mod sales;
    pub mod system;
}
pub mod services {
    pub mod events;
    pub mod lots;
    pub mod system;
}
mod dtos {
    pub(crate) mod admin;
}

/// Back-office routes. Mount behind `api_auth::admin_middleware()`.
pub fn mount_admin() -> actix_web::Scope {
    web::scope("/admin")
        .service(routes::events::get_events)
        .service(routes::events::post_event)
        .service(routes::events::patch_event)
        .service(routes::events::post_event_status)
        .service(routes::events::get_event_lots)
        .service(routes::events::get_pickup_slots)
        .service(routes::events::post_lot)
        .service(routes::events::patch_lot)
        .service(routes::events::post_lot_image)
        .service(routes::events::post_lot_status)
        .service(routes::events::post_lot_close)
        .service(routes::events::post_pickup_slot)
        .service(routes::sales::get_sales)
        .service(routes::sales::post_refund)
        .service(routes::sales::post_cancel_sale)
        .service(routes::sales::post_mark_paid)
        .service(routes::sales::get_registrations)
        .service(routes::sales::post_capture_deposit)
        .service(routes::sales::post_release_deposit)
        .service(routes::system::get_settings)
        .service(routes::system::patch_settings)
        .service(routes::system::post_run_job)
        .service(routes::system::get_logs)
}
