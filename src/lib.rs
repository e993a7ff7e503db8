mod audit;
mod board;
mod client;
mod clock;
mod common;
mod config;
mod logging;
mod pool;
pub mod protocol;
mod server;
pub mod session;
mod ship;
pub mod transport;

pub use audit::*;
pub use board::*;
pub use client::RandomBot;
pub use clock::TurnClock;
pub use common::*;
pub use config::*;
pub use logging::init_logging;
pub use pool::*;
pub use protocol::*;
pub use server::Server;
pub use session::{spawn_match, MatchReport, NoSlotAvailable, Termination};
pub use ship::*;
pub use transport::in_memory::InMemoryTransport;
pub use transport::tcp::TcpTransport;
pub use transport::{FrameError, Transport};
