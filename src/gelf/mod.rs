pub mod message;
pub mod tcp;
pub mod udp;

pub use message::{GelfError, GelfMessage};
pub use tcp::run_tcp_server;
pub use udp::run_udp_server;
