//! HTTP front-end for running ad-hoc SQL against MySQL or SQLite.
//!
//! The query text typed into the form is executed as written. Only the
//! parameters are bound through the driver. This is a tool for trusted users
//! and must not be exposed publicly.

pub mod config;
pub mod engine;
pub mod form;
pub mod fs;
pub mod http;
pub mod routes;
