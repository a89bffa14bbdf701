//! Tungsten - account, balance and product API.
//!
//! Every inbound request goes through the same admission pipeline
//! ([`funnel::Funnel`]): route resolution, identity, role permissions, rate
//! limiting and finally the controller action. Controllers and repositories
//! only talk to each other through the typed call bus in [`bus`].

pub mod authz;
pub mod backend;
pub mod bus;
pub mod controllers;
pub mod entities;
pub mod errors;
pub mod funnel;
pub mod jobs;
pub mod model;
pub mod operations;
pub mod rate_limit;
pub mod repository;
pub mod request;
pub mod router;
pub mod security;
pub mod settings;
pub mod storage;
pub mod web;
