//! Native messaging wire format.
//!
//! - **protocol**: tags, queued messages and wire constants
//! - **codec**: length-prefixed framing for AsyncRead/AsyncWrite

pub mod codec;
pub mod protocol;
