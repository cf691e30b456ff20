pub mod chat_repository;
pub mod poll_repository;
pub mod vote_repository;

pub use chat_repository::*;
pub use poll_repository::*;
pub use vote_repository::*;
