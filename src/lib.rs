// src/lib.rs

//! scriptwatch: change detection and deduplicated alerting for the script
//! assets of watched domains.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
