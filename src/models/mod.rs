pub mod command;
pub mod result;
