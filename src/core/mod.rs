pub mod actions;
pub mod agent;
pub mod runtime;
