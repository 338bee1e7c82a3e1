pub mod clients;
pub mod config;
pub mod error;
pub mod router;
pub mod state;

pub mod crypto {
    pub mod signature;
}

pub mod models {
    pub mod caption;
    pub mod plan;
    pub mod session;
    pub mod upload;
    pub mod user;
}

pub mod repositories {
    pub mod plan_limits;
}

pub mod services {
    pub mod captions;
    pub mod credentials;
    pub mod plan_limits;
    pub mod remote_call;
    pub mod session_guard;
    pub mod uploads;
}

pub mod handlers {
    pub mod captions;
    pub mod functions;
    pub mod plans;
    pub mod uploads;
}

pub mod middleware_layer {
    pub mod auth;
    pub mod rate_limit;
}

pub mod validation {
    pub mod upload;
}

#[cfg(test)]
mod testing;
