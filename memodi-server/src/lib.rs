pub mod http;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod state;
pub mod subsystems;
