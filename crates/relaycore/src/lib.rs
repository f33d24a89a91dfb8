#![allow(clippy::multiple_crate_versions)]

pub mod config;
pub mod download;
pub mod errors;
pub mod http;
pub mod models;
pub mod remote;
pub mod server;
pub mod service;
pub mod services;
pub mod session;
pub mod template;
pub mod utils;
