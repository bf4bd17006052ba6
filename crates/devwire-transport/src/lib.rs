//! Duplex byte-stream abstraction for device services.
//!
//! Everything above this crate talks to a device through a connected stream
//! obtained from a [`ServiceProvider`]. How the stream reaches the device
//! (USB multiplexer, network tunnel, a local socket in tests) is the
//! provider's business.
//!
//! The crate ships one provider, [`UnixSocketProvider`], which maps each
//! `(device, service)` pair onto a Unix domain socket below a root
//! directory.

pub mod error;
pub mod provider;
pub mod traits;

#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
pub use provider::{DeviceRef, ServiceProvider};
pub use traits::{DuplexStream, IpcStream};

#[cfg(unix)]
pub use provider::UnixSocketProvider;
#[cfg(unix)]
pub use uds::UnixDomainSocket;
