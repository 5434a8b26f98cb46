//! HTTP surface of portgate: plugin callbacks, admin API, portal login.

pub mod app;
pub mod middleware;
