/// User accounts and credential hashing

pub mod password;
pub mod storage;

pub use storage::{User, UserCredentials, UserStorage};
