//! Sign-in plumbing that only a terminal process needs

pub mod callback_server;

pub use callback_server::{CallbackData, CallbackServer};
