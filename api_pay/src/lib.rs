use actix_web::web::{self};

pub mod routes {
    pub mod pay;
    pub mod webhook;
}

pub mod services {
    pub mod pay;
    pub mod webhook;
}

mod dtos {
    pub(crate) mod pay;
}

pub fn mount_pay() -> actix_web::Scope {
    web::scope("/pay")
        .service(routes::pay::post_setup_intent)
        .service(routes::pay::get_cards)
        .service(routes::pay::post_card)
        .service(routes::pay::post_default_card)
        .service(routes::pay::delete_card)
}

pub fn mount_webhook() -> actix_web::Scope {
    web::scope("/pay").service(routes::webhook::post_webhook)
}
