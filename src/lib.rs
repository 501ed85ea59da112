pub mod core;
pub mod tickets;
