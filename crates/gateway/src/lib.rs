//! Gateway: webhook HTTP server, dispatcher and the worker pool that runs
//! consumers off the request path.
//!
//! Lifecycle:
//! 1. Build a [`PluginRegistry`](wxhook_plugins::PluginRegistry) and register plugins
//! 2. Build a [`Dispatcher`] (classifier chain, pool, optional attachment resolver)
//! 3. Serve `POST {webhook_path}` and `GET /health` until shutdown
//! 4. Drain queued deliveries

pub mod dispatcher;
pub mod error;
pub mod outbound;
pub mod pool;
pub mod server;

pub use {
    dispatcher::{Dispatcher, DispatcherBuilder, MessageObserver, observer_fn},
    error::{Error, Result},
    outbound::HttpGateway,
    pool::WorkPool,
    server::{build_app, start_server},
};
