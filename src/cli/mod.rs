pub mod command;
pub mod convert;
pub mod info;
pub mod progress;
