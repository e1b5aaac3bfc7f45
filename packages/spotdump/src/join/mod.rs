pub mod filter;
pub mod partition;
pub mod stats;
pub mod worker;
