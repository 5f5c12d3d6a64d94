pub mod audit;
pub mod idempotency;
pub mod request_logger;
