pub mod hash;
pub mod service;
pub mod store;
