pub mod lifecycle;
pub mod poller;
pub mod producer;
pub mod runner;
pub mod store;
