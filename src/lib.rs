// Portal Session - Library root

pub mod auth;
pub mod config;
pub mod error;
pub mod http_client;
pub mod impersonation;
pub mod navigation;
pub mod session;
pub mod storage;
pub mod tab;
pub mod utils;
