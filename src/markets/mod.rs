// src/markets/mod.rs
pub mod client;
pub mod models;
