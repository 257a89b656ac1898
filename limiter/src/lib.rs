use middleware::{client::ClientRateLimiter, global::GlobalLimiter};

pub mod middleware {
    pub mod client;
    pub mod global;
}

pub fn global_middleware(permits_per_second: u32) -> GlobalLimiter {
    GlobalLimiter::new(permits_per_second)
}

pub fn client_middleware(permits_per_minute: u32) -> ClientRateLimiter {
    ClientRateLimiter::new(permits_per_minute)
}
