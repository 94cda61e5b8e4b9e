pub mod broker;
pub mod credentials;
pub mod oauth1;
pub mod services;
pub mod session;
pub mod tokens;
