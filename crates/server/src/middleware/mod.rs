//! HTTP middleware stack for the API server.
//!
//! # Middleware Order (bottom to top in Router)
//!
//! 1. Sentry layer (capture errors)
//! 2. `TraceLayer` (request tracing)
//! 3. Request ID (add unique ID to each request)
//! 4. Session layer (tower-sessions with `PostgreSQL` store)

pub mod actor;
pub mod request_id;
pub mod session;

pub use actor::{ActorRejection, OptionalActor, RequireActor, clear_actor, set_actor};
pub use request_id::request_id_middleware;
pub use session::create_session_layer;
