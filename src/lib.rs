pub mod config;
pub mod context;
pub mod data;
pub mod error;
pub mod lifecycle;
pub mod procedures;
pub mod server;
pub mod state;

pub mod crypto {
    pub mod state;
    pub mod token;
}

pub mod models {
    pub mod provider;
    pub mod session;
    pub mod user;
}

pub mod services {
    pub mod auth;
    pub mod oauth;
}

pub mod handlers {
    pub mod auth;
    pub mod rpc;
}

pub mod middleware_layer {
    pub mod cookies;
    pub mod cors;
    pub mod session;
}

pub mod rpc {
    pub mod envelope;
    pub mod error;
    pub mod router;
}

pub mod validation {
    pub mod input;
}
