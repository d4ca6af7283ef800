pub mod base;
pub mod idle;
pub mod mpmc;
pub mod spsc;
