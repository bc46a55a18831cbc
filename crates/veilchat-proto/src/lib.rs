//! Wire formats for the Veilchat discovery protocol and message frames.
//!
//! The discovery channel is deliberately plain: line-oriented text over
//! a stream transport, one request per connection, wire-stable for
//! interoperability with existing clients. Message frames carry a
//! cleartext conversation-id header followed by raw ciphertext.
//!
//! # Modules
//!
//! - [`request`] — `DISCOVER` / `KEEPALIVE` request parse and encode
//! - [`snapshot`] — membership snapshot codec (`user:host:port` lines)
//! - [`envelope`] — message frame and the encrypted payload layout

pub mod envelope;
pub mod request;
pub mod snapshot;
