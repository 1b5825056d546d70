//! lhm - online schema-change safety core
//!
//! Resilient statement execution for long-running MySQL migrations and
//! reconciliation of the artifacts (archive tables, provisional tables and
//! change-capture triggers) that interrupted migrations leave behind.
//!
//! - [`connection`]: `ResilientConnection`, retry loop and error classification
//! - [`naming`]: the artifact naming grammar
//! - [`cleanup`]: scanning for and dropping artifacts
//! - [`storage`]: session backends (MySQL, in-memory mock)

pub mod cleanup;
pub mod config;
pub mod connection;
pub mod interfaces;
pub mod naming;
pub mod proxy;
pub mod storage;
pub mod utils;
