//! Property-list messaging and remote debugging for device services.
//!
//! # Crate Structure
//!
//! - [`transport`]: duplex byte streams and the service-provider capability
//! - [`plist`]: XML and binary property-list codec
//! - [`frame`]: length-prefixed message channel with exchange and streaming reads
//! - [`debug`]: remote-debug packets, launch handshake, console output and
//!   kill-signal watch

/// Re-export transport types.
pub mod transport {
    pub use devwire_transport::*;
}

/// Re-export property-list codec types.
pub mod plist {
    pub use devwire_plist::*;
}

/// Re-export message channel types.
pub mod frame {
    pub use devwire_frame::*;
}

/// Re-export remote-debug protocol types.
pub mod debug {
    pub use devwire_debug::*;
}
