pub mod app_config;
pub mod catalog_repo;
pub mod database;
pub mod memory;
pub mod redis_repo;

mod ledger;
mod payment_repo;
mod rows;
mod ticket_repo;

pub use catalog_repo::PgBookingStore;
pub use database::DbClient;
pub use memory::InMemoryStore;
pub use redis_repo::RedisClient;
