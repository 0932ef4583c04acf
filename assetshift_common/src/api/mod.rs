pub mod resolve;
pub mod rewrite;
pub mod service;
