//! `Tracehop` Core: correlation context, context-propagating task decorators,
//! and the header rules shared by inbound and outbound HTTP plumbing.

pub mod context;
pub mod decorator;
pub mod headers;
pub mod id;

pub use context::{CorrelationContext, CorrelationSnapshot, REQUEST_ID_KEY, SESSION_ID_KEY};
pub use decorator::{BoxTask, ContextPropagatingDecorator, TaskDecorator};
pub use headers::{
    extract_correlation_id, stamp_outbound, IdSource, StampOutcome, HOST_ID_HEADER,
    REQUEST_ID_HEADER, SESSION_ID_HEADER,
};
pub use id::CorrelationId;
