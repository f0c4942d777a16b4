pub mod errors;
pub mod issuer;
pub mod models;
pub mod poller;
pub mod ports;
pub mod requester;
