//! The fixed launch handshake.
//!
//! Steps, each a single write:
//! 1. `QStartNoAckMode`
//! 2. raw `+` acknowledgement (unframed)
//! 3. `QEnvironmentHexEncoded:`
//! 4. `QSetDisableASLR:1`
//! 5. `A` with one `2L,i,H` triple per argument
//! 6. `qLaunchSuccess`
//! 7. `D` when launch-only, `vCont;c` otherwise

use crate::error::Result;
use crate::packet::Packet;

pub const START_NO_ACK_MODE: &str = "QStartNoAckMode";
pub const ACK: &[u8] = b"+";
pub const ENVIRONMENT_HEX_ENCODED: &str = "QEnvironmentHexEncoded:";
pub const DISABLE_ASLR: &str = "QSetDisableASLR:1";
pub const LAUNCH_SUCCESS: &str = "qLaunchSuccess";
pub const DETACH: &str = "D";
pub const CONTINUE: &str = "vCont;c";

/// One write of the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeStep {
    Packet(Packet),
    /// The bare `+` byte.
    Ack,
}

impl HandshakeStep {
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            HandshakeStep::Packet(packet) => packet.to_bytes(),
            HandshakeStep::Ack => ACK.to_vec(),
        }
    }
}

/// Payload of the `A` packet.
///
/// Argument `i` with byte length `L` contributes `2L,i,<hex bytes>`; the
/// triples are joined with `,`.
pub fn arguments_payload<I, A>(args: I) -> String
where
    I: IntoIterator<Item = A>,
    A: AsRef<str>,
{
    let triples: Vec<String> = args
        .into_iter()
        .enumerate()
        .map(|(index, arg)| {
            let bytes = arg.as_ref().as_bytes();
            format!("{},{},{}", bytes.len() * 2, index, hex::encode(bytes))
        })
        .collect();
    format!("A{}", triples.join(","))
}

/// Steps 1 through 6, ending with the launch-success query.
pub fn launch_steps<I, A>(args: I) -> Result<Vec<HandshakeStep>>
where
    I: IntoIterator<Item = A>,
    A: AsRef<str>,
{
    Ok(vec![
        HandshakeStep::Packet(Packet::new(START_NO_ACK_MODE)?),
        HandshakeStep::Ack,
        HandshakeStep::Packet(Packet::new(ENVIRONMENT_HEX_ENCODED)?),
        HandshakeStep::Packet(Packet::new(DISABLE_ASLR)?),
        HandshakeStep::Packet(Packet::new(arguments_payload(args))?),
        HandshakeStep::Packet(Packet::new(LAUNCH_SUCCESS)?),
    ])
}

/// Step 7.
pub fn resume_step(launch_only: bool) -> Result<HandshakeStep> {
    let payload = if launch_only { DETACH } else { CONTINUE };
    Ok(HandshakeStep::Packet(Packet::new(payload)?))
}
