pub mod jwt;
pub mod manager;
pub mod pair;
