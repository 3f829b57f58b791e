//! HTTP request handlers

pub mod auth;
pub mod health;
pub mod protected;
pub mod webhook;

pub use health::health;
