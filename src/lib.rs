pub mod types;
pub mod parser;
pub mod search;
pub mod job;
pub mod builtin;
pub mod global;
pub mod eval;
pub mod signals;
