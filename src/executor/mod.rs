pub mod request;
pub mod telemetry;
