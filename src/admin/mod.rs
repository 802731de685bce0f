mod api;
mod server;

pub use api::AdminApi;
pub use server::AdminServer;
