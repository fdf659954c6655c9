pub mod app_config;
pub mod database;
pub mod memory;
pub mod pg_repo;
pub mod redis_repo;
#[cfg(feature = "kafka")]
pub mod events;

pub use database::DbClient;
pub use memory::MemoryStore;
pub use pg_repo::PgBookingStore;
pub use redis_repo::RedisClient;
#[cfg(feature = "kafka")]
pub use events::EventProducer;
