//! Tweet Service - permission inheritance over reply threads with a
//! Redis-backed visibility index.

pub mod config;
pub mod models;
pub mod services;
pub mod startup;
