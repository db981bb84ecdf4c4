pub mod logger;
pub mod stats;
