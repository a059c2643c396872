pub mod config;
pub mod error;
pub mod repository;
pub mod types;

pub use config::AppConfig;
pub use error::{NocturneError, NocturneResult};
pub use repository::SleepRecordRepository;
pub use types::{NewSleepRecord, SleepRecord, SortOrder};
