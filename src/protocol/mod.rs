//! Postgres session-protocol subset
//!
//! Only the messages involved in connection establishment are modeled:
//! startup, authentication (cleartext and SASL/SCRAM), the server's session
//! preamble, and the single verification query round-trip. Query execution
//! beyond that is the application layer's concern, not the bootstrap's.

mod constants;
mod decode;
mod encode;
mod message;

pub use constants::PROTOCOL_VERSION;
pub use decode::decode_message;
pub use encode::encode_message;
pub use message::{AuthenticationMessage, BackendMessage, ErrorFields, FrontendMessage};
