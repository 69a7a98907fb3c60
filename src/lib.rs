pub mod audit;
pub mod backend;
pub mod client;
pub mod config;
pub mod db;
pub mod dto;
pub mod entity;
pub mod error;
#[cfg(any(test, feature = "testing"))]
pub mod memory;
pub mod middleware;
pub mod models;
pub mod response;
pub mod routes;
pub mod services;
pub mod state;
