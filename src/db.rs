pub mod error;
pub mod memory_store;
pub mod models;
pub mod sample_repository;
pub mod sample_store;

pub use error::DbError;
pub use memory_store::MemorySampleStore;
pub use models::*;
pub use sample_repository::SampleRepository;
pub use sample_store::{last_per_key, SampleStore};
