//! Provider implementations for the supported backends

pub mod in_memory;
#[cfg(feature = "mongodb_backend")]
pub mod mongodb;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod registry;

pub use in_memory::{InMemoryProvider, InMemoryStore, InMemoryTransactions};
#[cfg(feature = "mongodb_backend")]
pub use mongodb::MongoProvider;
#[cfg(feature = "postgres")]
pub use postgres::{PostgresProvider, PostgresTransactions};
pub use registry::{Connection, MEMORY, MONGODB, POSTGRES, ProviderConstructor, ProviderRegistry};
