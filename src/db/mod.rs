pub mod cancellation;
pub mod connection;
pub mod schema;
pub mod store;

pub use cancellation::*;
pub use connection::*;
pub use schema::*;
pub use store::*;
