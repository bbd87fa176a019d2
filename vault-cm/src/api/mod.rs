//! HTTP API handlers for vault-cm
//!
//! REST controls for reconciliation runs plus an SSE progress stream.

pub mod health;
pub mod matching;
pub mod reconcile;
pub mod settings;
pub mod sse;

pub use health::health_routes;
pub use matching::matching_routes;
pub use reconcile::reconcile_routes;
pub use settings::settings_routes;
pub use sse::reconcile_event_stream;
