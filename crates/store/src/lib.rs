pub mod memory;

pub use memory::MemorySleepRecordRepository;
