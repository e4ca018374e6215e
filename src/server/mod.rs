pub mod dto;
pub mod response;
mod router;
mod rpc;

pub use router::{AppState, create_router};
