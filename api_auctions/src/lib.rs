use actix_web::web;

pub mod routes {
    pub mod bids;
    pub mod catalog;
    pub mod purchases;
    pub mod registration;
    pub mod watch;
}

pub mod services {
    pub mod bidding;
    pub mod catalog;
    pub mod holds;
    pub mod maintenance;
    pub mod pickup;
    pub mod refunds;
    pub mod registration;
    pub mod rules;
    pub mod settlement;
    pub mod watch;
}

pub mod dtos {
    pub mod auction;
}

#[cfg(any(test, feature = "testing"))]
pub mod testing;

/// Public browsing: events, lots, bid history and site settings.
pub fn mount_catalog() -> actix_web::Scope {
    web::scope("/catalog")
        .service(routes::catalog::get_events)
        .service(routes::catalog::get_event)
        .service(routes::catalog::get_pickup_slots)
        .service(routes::catalog::get_lot)
        .service(routes::catalog::get_lot_bids)
        .service(routes::catalog::get_settings)
}

/// Bidder actions. Mount inside a scope guarded by the auth middleware.
pub fn mount_auctions() -> actix_web::Scope {
    web::scope("/auctions")
        .service(routes::registration::post_register)
        .service(routes::registration::get_registration)
        .service(routes::registration::post_reminder)
        .service(routes::registration::delete_reminder)
        .service(routes::registration::get_reminders)
        .service(routes::bids::post_bid)
        .service(routes::bids::get_my_bids)
        .service(routes::watch::get_watchlist)
        .service(routes::watch::post_watch)
        .service(routes::watch::delete_watch)
        .service(routes::purchases::get_purchases)
        .service(routes::purchases::post_pickup)
}
