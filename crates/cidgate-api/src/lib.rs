// cidgate-api: HTTP transport for probing and fetching from IPFS gateways

pub mod error;
pub mod gateway;
pub mod transport;

pub use error::Error;
pub use gateway::{GatewayClient, ObjectHead, ObjectStream, RangeRead};
pub use transport::TransportConfig;
