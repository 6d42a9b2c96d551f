pub mod memory;
pub mod slack;
pub mod traits;
