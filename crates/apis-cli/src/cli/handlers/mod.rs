//! Command handlers for the APIS CLI

pub mod admin;
pub mod auth;
pub mod data;
