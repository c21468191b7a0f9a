//! 传输层：面向 OpenAI 兼容端点的 HTTP 客户端
//!
//! HTTP transport used by the remote model adapter.

pub mod http;

pub use http::{HttpTransport, TransportError};
