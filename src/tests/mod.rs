pub mod common;

mod access_lifecycle;
mod token_refresh;
