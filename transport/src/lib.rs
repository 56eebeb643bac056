//! # Transport - broker session transport
//!
//! Defines [`BrokerTransport`], the trait the session manager is generic
//! over, plus the two implementations that ship with this crate: an
//! always-compiled [`simulated::SimulatedTransport`] and a
//! `live-transport`-feature-gated [`live::LiveTransport`] placeholder. See
//! [`new_transport`] for selection.

mod error;
#[cfg(feature = "live-transport")]
mod live;
mod simulated;
mod transport;

pub use error::BrokerError;
pub use simulated::SimulatedTransport;
pub use transport::{new_transport, transport_kind_name, BrokerTransport, QueryKind, TransportEvent, TransportKind};

#[cfg(feature = "live-transport")]
pub use live::LiveTransport;
