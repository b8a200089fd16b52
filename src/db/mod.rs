pub mod connection;
pub mod demo;
pub mod schema;
pub mod store;
pub mod surreal;

pub use connection::*;
pub use demo::DemoStore;
pub use schema::*;
pub use store::*;
pub use surreal::SurrealStore;
