pub mod hashing;
pub mod paths;
