//! fleet-authz 库
//! 多租户集群下发控制面的细粒度授权与订阅同步状态

pub mod auth;
pub mod authz;
pub mod config;
pub mod db;
pub mod error;
pub mod guard;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;
pub mod telemetry;
