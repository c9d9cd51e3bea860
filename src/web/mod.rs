//! HTTP layer: signaling endpoint and static page serving

pub mod handlers;
pub mod routes;

pub use routes::create_router;
