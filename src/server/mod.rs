pub mod api;
pub mod router;

pub use router::{build_router, serve};
