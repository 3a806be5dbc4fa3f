pub mod handler;
pub mod server;

mod error;
mod methods;

pub use error::{InternalRpcError, RpcResponseError};
pub use handler::{Handler, HandlerResult, RpcHandler};
pub use methods::{register_methods, NODE_NAME};
pub use server::RpcServer;
