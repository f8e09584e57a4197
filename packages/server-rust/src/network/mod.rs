//! Networking: configuration, inbound correlation, middleware, handlers and
//! the server lifecycle.

pub mod config;
pub mod correlation;
pub mod handlers;
pub mod middleware;
pub mod module;
pub mod shutdown;

pub use config::*;
pub use correlation::{CorrelationLayer, CorrelationService, RequestCorrelation};
pub use handlers::AppState;
pub use module::NetworkModule;
pub use shutdown::*;
