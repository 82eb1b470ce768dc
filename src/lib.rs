#![doc = "The `taskbox` library crate."]
#![doc = ""]
#![doc = "Domain models, authentication, routing and error handling for the Taskbox"]
#![doc = "API. The binary (`main.rs`) wires these modules into an HTTP server."]

pub mod auth;
pub mod avatar;
pub mod config;
pub mod emails;
pub mod error;
pub mod models;
pub mod routes;
