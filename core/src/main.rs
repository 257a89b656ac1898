mod cors;

use std::sync::Arc;

use actix_web::{
    App, HttpServer,
    web::{self},
};
use common::{
    email::EmailClient,
    env_config::Config,
    payments::{HoldGateway, StripeGateway},
};
use notifier::Notifier;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // get env vars
    let config = Config::from_env();
    let origin = config.cors_allowed_origin.clone();

    // init logger
    if config.console_logging_enabled {
        logger::setup(&config.log_file).expect("Failed to set up logger");
    }

    // init db connection
    let pool = db::setup(
        &config.database_url,
        config.is_production(),
        config.db_max_connections,
    )
    .await
    .expect("Failed to set up database");

    // payments and email
    let client = common::stripe::create_client(&config.stripe.secret_key);
    let currency =
        common::stripe::parse_currency(&config.stripe.currency).expect("Invalid CURRENCY");
    let gateway: Arc<dyn HoldGateway> = Arc::new(StripeGateway::new(client, currency));
    let notifier = Notifier::new(
        Arc::new(EmailClient::new(config.email.clone())),
        &config.web_app_url,
    );

    // background jobs; the scheduler must outlive the server
    let _scheduler = if config.jobs.enabled {
        let ctx = jobs::JobContext {
            pool: pool.clone(),
            gateway: gateway.clone(),
            notifier: notifier.clone(),
            config: config.clone(),
        };
        Some(
            jobs::start_scheduler(ctx)
                .await
                .expect("Failed to start job scheduler"),
        )
    } else {
        log::warn!("Background jobs are disabled");
        None
    };

    let config_data = config.clone();
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::Data::new(config_data.clone()))
            .app_data(web::Data::new(gateway.clone()))
            .app_data(web::Data::new(notifier.clone()))
            .wrap(limiter::global_middleware(config_data.global_rate_limit)) // 4th
            .wrap(logger::middleware()) // 3rd
            .wrap(extractor::middleware()) // 2nd
            .wrap(cors::middleware(&origin)) // 1st
            .service(
                web::scope("/api")
                    .service(
                        api_auth::mount_auth()
                            .wrap(limiter::client_middleware(config_data.auth_rate_limit)),
                    )
                    .service(api_auctions::mount_catalog())
                    .service(api_pay::mount_webhook())
                    .service(
                        web::scope("/secured")
                            .wrap(api_auth::auth_middleware())
                            .service(api_auth::mount_user())
                            .service(api_pay::mount_pay())
                            .service(api_auctions::mount_auctions()),
                    )
                    .service(api_admin::mount_admin().wrap(api_auth::admin_middleware())),
            )
    })
    .bind((config.server_host.as_str(), config.server_port))?
    .workers(config.num_workers)
    .run()
    .await
}
