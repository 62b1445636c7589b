//! A client implementation of the LIME messaging protocol: a stateful,
//! JSON-over-TCP envelope exchange with in-band TLS upgrade and no
//! length-prefixed framing.
//!
//! The module layout follows the protocol's own layering, leaf to root:
//! [`envelope`] and [`node`] are the data model, [`wire`] (de)serializes it,
//! [`transport`] frames it over a socket, [`channel`] dispatches it to
//! subscribers, and [`client`] drives the handshake on top of all of the
//! above.

pub mod channel;
pub mod cli;
pub mod client;
pub mod config;
pub mod defaults;
pub mod envelope;
pub mod error;
pub mod node;
pub mod ping;
pub mod recipient_filler;
pub mod timeout;
pub mod trace;
pub mod transport;
pub mod wire;

pub use client::{ClientSession, Credentials};
pub use config::Config;
pub use error::{LimeError, Result};
pub use node::Node;
