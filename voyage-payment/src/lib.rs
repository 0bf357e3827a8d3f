pub mod amount;
pub mod client;
pub mod config;
pub mod mock;
pub mod request;
pub mod response;
pub mod signature;
pub mod tran_id;

pub use client::PaywayClient;
pub use config::GatewayConfig;
pub use mock::MockPaymentGateway;
