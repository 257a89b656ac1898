use std::{env, str::FromStr, sync::Arc};

#[derive(Clone, Debug)]
/// Configuration struct for the server.
///
/// This struct holds all the necessary configuration parameters
/// required to initialize and run the server and the scheduled jobs.
/// It includes database connection details, JWT configuration,
/// server host and port, number of worker threads, CORS settings,
/// logging preferences, Stripe and email provider credentials
/// and the job schedules.
pub struct Config {
    // environment
    pub environment: String, // development or production
    /// The URL of the database to connect to.
    pub database_url: String,
    /// Size of the connection pool shared by handlers and jobs.
    pub db_max_connections: u32,
    /// Configuration for JWT (JSON Web Token) authentication.
    pub jwt_config: JwtConfig,
    /// The hostname or IP address the server will bind to.
    pub server_host: String,
    /// The port number the server will listen on.
    pub server_port: u16,
    /// The number of worker threads to spawn for handling requests.
    pub num_workers: usize,
    /// The allowed origin for CORS (Cross-Origin Resource Sharing).
    pub cors_allowed_origin: String,
    /// A boolean indicating whether console logging is enabled.
    pub console_logging_enabled: bool,
    /// File the logger appends to.
    pub log_file: String,
    /// Public URL of the web application, used for links in emails.
    pub web_app_url: String,
    /// Global request budget per second.
    pub global_rate_limit: u32,
    /// Sign-in attempts allowed per client IP and minute.
    pub auth_rate_limit: u32,
    /// Stripe configuration.
    pub stripe: StripeConfig,
    /// Transactional email provider configuration.
    pub email: EmailConfig,
    /// Scheduled job configuration.
    pub jobs: JobsConfig,
}

#[derive(Clone, Debug)]
pub struct StripeConfig {
    /// Stripe secret key
    pub secret_key: String,
    /// Stripe webhook secret
    pub webhook_secret: String,
    /// Lowercase ISO currency code used for every hold and charge.
    pub currency: String,
    /// Amount in cents held (and immediately released) to validate a new card.
    pub card_verification_amount: i64,
}

#[derive(Clone, Debug)]
pub struct EmailConfig {
    /// API key of the email provider. Empty disables sending.
    pub api_key: String,
    /// Base URL of the provider API.
    pub api_url: String,
    /// Sender address.
    pub from: String,
}

#[derive(Clone, Debug)]
pub struct JobsConfig {
    /// Whether the in-process scheduler runs at all.
    pub enabled: bool,
    pub close_auction_cron: String,
    pub event_start_cron: String,
    pub watchlist_cron: String,
    /// How long before an event starts reminders go out.
    pub reminder_lead_minutes: i64,
    /// How long before a lot closes watchers are notified.
    pub watchlist_lead_minutes: i64,
}

#[derive(Clone, Debug)]
/// Configuration for JSON Web Token (JWT) authentication.
///
/// This struct contains the secret key used to sign JWTs and
/// the expiration time in hours for issued tokens.
pub struct JwtConfig {
    /// The secret key used to sign and verify JWTs.
    pub secret: String,
    /// The expiration time for JWTs in hours.
    pub expiration_hours: i64,
}

impl JwtConfig {
    /// Creates a new `JwtConfig` instance from environment variables.
    ///
    /// Reads the JWT configuration from environment variables:
    /// - `JWT_SECRET`: Required. The secret key for JWT signing.
    /// - `JWT_EXPIRATION_HOURS`: Optional. Defaults to 24 hours if not provided.
    ///
    /// # Panics
    ///
    /// This function will panic if:
    /// - `JWT_SECRET` environment variable is not set
    /// - `JWT_EXPIRATION_HOURS` is set but cannot be parsed as a valid number
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        JwtConfig {
            secret: env::var("JWT_SECRET").expect("JWT_SECRET must be set"),
            expiration_hours: env::var("JWT_EXPIRATION_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .expect("JWT_EXPIRATION_HOURS must be a valid number"),
        }
    }
}

/// Reads an environment variable and parses it, falling back to `default`
/// when the variable is missing or malformed.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

impl Config {
    /// Creates a new `Config` instance from environment variables.
    ///
    /// # Environment Variables
    ///
    /// Required:
    /// - `ENVIRONMENT`: `development` or `production`
    /// - `DATABASE_URL`: Connection string for the database
    /// - `JWT_SECRET`: Secret key for JWT signing (via `JwtConfig::from_env()`)
    ///
    /// Optional (with defaults):
    /// - `IP` (127.0.0.1), `PORT` (8080), `WORKERS` (4), `DB_MAX_CONNECTIONS` (20)
    /// - `CORS_ALLOWED_ORIGIN` (http://localhost:3000)
    /// - `ENABLE_CONSOLE_LOGGING` (true), `LOG_FILE` (auction.log)
    /// - `WEB_APP_URL` (http://localhost:3000)
    /// - `GLOBAL_RATE_LIMIT` (50), `AUTH_RATE_LIMIT` (10 per minute and IP)
    /// - `STRIPE_SECRET_KEY`, `STRIPE_WEBHOOK_SECRET`, `CURRENCY` (usd),
    ///   `CARD_VERIFICATION_AMOUNT` (100)
    /// - `EMAIL_API_KEY`, `EMAIL_API_URL` (https://api.resend.com), `EMAIL_FROM`
    /// - `JOBS_ENABLED` (true), `CLOSE_AUCTION_CRON`, `EVENT_START_CRON`,
    ///   `WATCHLIST_CRON`, `REMINDER_LEAD_MINUTES` (60), `WATCHLIST_LEAD_MINUTES` (60)
    ///
    /// # Panics
    ///
    /// This function will panic if required environment variables are missing.
    pub fn from_env() -> Arc<Self> {
        dotenvy::dotenv().ok();

        Arc::new(Config {
            environment: env::var("ENVIRONMENT").expect("ENVIRONMENT must be set"),
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            db_max_connections: env_or("DB_MAX_CONNECTIONS", 20),
            jwt_config: JwtConfig::from_env(),
            server_host: env_string("IP", "127.0.0.1"),
            server_port: env_or("PORT", 8080),
            num_workers: env_or("WORKERS", 4),
            cors_allowed_origin: env_string("CORS_ALLOWED_ORIGIN", "http://localhost:3000"),
            console_logging_enabled: env_string("ENABLE_CONSOLE_LOGGING", "true").to_lowercase()
                == "true",
            log_file: env_string("LOG_FILE", "auction.log"),
            web_app_url: env_string("WEB_APP_URL", "http://localhost:3000"),
            global_rate_limit: env_or("GLOBAL_RATE_LIMIT", 50),
            auth_rate_limit: env_or("AUTH_RATE_LIMIT", 10),
            stripe: StripeConfig {
                secret_key: env::var("STRIPE_SECRET_KEY").unwrap_or_default(),
                webhook_secret: env::var("STRIPE_WEBHOOK_SECRET").unwrap_or_default(),
                currency: env_string("CURRENCY", "usd").to_lowercase(),
                card_verification_amount: env_or("CARD_VERIFICATION_AMOUNT", 100),
            },
            email: EmailConfig {
                api_key: env::var("EMAIL_API_KEY").unwrap_or_default(),
                api_url: env_string("EMAIL_API_URL", "https://api.resend.com"),
                from: env_string("EMAIL_FROM", "Auctions <no-reply@localhost>"),
            },
            jobs: JobsConfig {
                enabled: env_string("JOBS_ENABLED", "true").to_lowercase() == "true",
                close_auction_cron: env_string("CLOSE_AUCTION_CRON", "0 * * * * *"),
                event_start_cron: env_string("EVENT_START_CRON", "0 */5 * * * *"),
                watchlist_cron: env_string("WATCHLIST_CRON", "30 */5 * * * *"),
                reminder_lead_minutes: env_or("REMINDER_LEAD_MINUTES", 60),
                watchlist_lead_minutes: env_or("WATCHLIST_LEAD_MINUTES", 60),
            },
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

#[cfg(any(test, feature = "testing"))]
impl Config {
    /// Configuration with no external services, for tests.
    pub fn for_tests() -> Arc<Self> {
        Arc::new(Config {
            environment: "development".to_string(),
            database_url: String::new(),
            db_max_connections: 1,
            jwt_config: JwtConfig {
                secret: "test_secret".to_string(),
                expiration_hours: 1,
            },
            server_host: "127.0.0.1".to_string(),
            server_port: 8080,
            num_workers: 1,
            cors_allowed_origin: "http://localhost:3000".to_string(),
            console_logging_enabled: false,
            log_file: String::new(),
            web_app_url: "http://localhost:3000".to_string(),
            global_rate_limit: 50,
            auth_rate_limit: 10,
            stripe: StripeConfig {
                secret_key: String::new(),
                webhook_secret: String::new(),
                currency: "usd".to_string(),
                card_verification_amount: 100,
            },
            email: EmailConfig {
                api_key: String::new(),
                api_url: "https://api.resend.com".to_string(),
                from: "Auctions <no-reply@localhost>".to_string(),
            },
            jobs: JobsConfig {
                enabled: false,
                close_auction_cron: "0 * * * * *".to_string(),
                event_start_cron: "0 */5 * * * *".to_string(),
                watchlist_cron: "30 */5 * * * *".to_string(),
                reminder_lead_minutes: 60,
                watchlist_lead_minutes: 60,
            },
        })
    }
}
