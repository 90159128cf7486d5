//! Caller-facing HTTP surface

pub mod handlers;
pub mod routes;
