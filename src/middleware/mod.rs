//! HTTP middleware for security and observability.
//!
//! - **Function Key Authentication**: Constant-time key comparison with
//!   per-IP failure limiting; health probes and the sample API are bypassed
//! - **Request ID**: Automatic generation and propagation for correlation
//!
//! ```text
//! Request → Function Key Auth → Request ID → Handler → Response
//!                ↓                   ↓
//!            401 Unauthorized   X-Request-Id header
//! ```

pub mod function_key;
pub mod ip;
pub mod request_id;

pub use function_key::FunctionKeyAuth;
pub use ip::{UNKNOWN_IP, extract_client_ip};
pub use request_id::RequestIdLayer;
