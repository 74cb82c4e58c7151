pub mod handlers;
pub mod server;


pub use server::{RelayServer, RelayServerBuilder, ServerState};
