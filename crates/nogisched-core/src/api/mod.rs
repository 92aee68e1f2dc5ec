//! Feed access over JSONP.
//!
//! The public feeds only speak JSONP: the response is a script calling a
//! callback function with the JSON payload. `jsonp` implements that
//! transport and `FeedClient` builds the schedule and member requests on
//! top of it.

pub mod client;
pub mod error;
pub mod jsonp;

#[cfg(test)]
pub(crate) mod testing;

pub use client::FeedClient;
pub use error::ApiError;
pub use jsonp::{
    CallbackMode, HttpScriptLoader, JsonpClient, JsonpOptions, PendingRequest, ScriptLoader,
    DEFAULT_CALLBACK_PARAM, DEFAULT_FIXED_CALLBACK,
};
