// Library exports for feedline
// This allows integration tests and external code to use feedline modules

pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod feed;
pub mod gateway;
pub mod ratelimit;
pub mod routes;
pub mod state;
