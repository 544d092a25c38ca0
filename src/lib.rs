//! A conversational stock-price agent served over HTTP.
//!
//! A query goes through the API key gate, starts a [`session::StreamSession`]
//! that drives the agent, and is answered as a stream of
//! [`protocol::WireEvent`] frames by one of two [`transport::Transport`]s.

pub mod agent;
mod ai_sdk;
pub mod auth;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod protocol;
pub mod server;
pub mod session;
pub mod sse;
pub mod tools;
pub mod transport;
pub mod translate;
