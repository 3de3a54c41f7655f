pub mod common;
pub mod completions;
pub mod files;
pub mod hierarchy;
pub mod order;
pub mod people;
pub mod sync;
