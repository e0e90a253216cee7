pub mod dispatch;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod transport;

pub use dispatch::Dispatcher;
pub use registry::{RegistryError, ToolHandler, ToolRegistry};
pub use server::Server;
pub use transport::{run_stdio, serve};
