pub mod app_config;
pub mod booking_repo;
pub mod catalog_repo;
pub mod database;
#[cfg(feature = "kafka")]
pub mod events;
pub mod memory_repo;
pub mod redis_repo;

pub use app_config::Config;
pub use booking_repo::PgReservationStore;
pub use catalog_repo::{PgCatalog, StaticCatalog};
pub use database::DbClient;
#[cfg(feature = "kafka")]
pub use events::EventProducer;
pub use memory_repo::MemoryStore;
pub use redis_repo::RedisClient;
