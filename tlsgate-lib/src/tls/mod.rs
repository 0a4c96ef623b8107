pub mod acceptor;
pub mod context;
pub mod session;
pub mod versions;

pub use acceptor::{TlsServer, TlsServerBuilder};
pub use context::TlsContext;
pub use session::TlsSession;
pub use versions::{allowed_versions, protocol_versions};
