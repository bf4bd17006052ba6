use tracing::warn;

/// Largest payload kept while scanning. Longer packets are truncated to
/// this many bytes and the remainder is skipped up to `#`.
pub const MAX_PACKET_PAYLOAD: usize = 1024 * 1024;

/// One `$<payload>#<cc>` packet lifted off the inbound stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPacket {
    pub payload: Vec<u8>,
    pub checksum: [u8; 2],
}

impl RawPacket {
    /// Whether the two checksum digits match the payload.
    pub fn checksum_matches(&self) -> bool {
        let Ok(expected) = hex::decode(self.checksum) else {
            return false;
        };
        let actual = self
            .payload
            .iter()
            .fold(0u8, |sum, &byte| sum.wrapping_add(byte));
        expected == [actual]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    /// Between packets; everything up to the next `$` is ignored.
    Idle,
    Payload,
    /// Payload limit reached; counting skipped bytes until `#`.
    Overflow(usize),
    Checksum(usize),
}

/// Incremental packet scanner.
///
/// Bytes outside packets (acknowledgements, noise) are skipped. A packet
/// split across chunks is held until its checksum digits arrive.
#[derive(Debug, Clone)]
pub struct PacketScanner {
    state: ScanState,
    payload: Vec<u8>,
    checksum: [u8; 2],
}

impl Default for PacketScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketScanner {
    pub fn new() -> Self {
        Self {
            state: ScanState::Idle,
            payload: Vec::new(),
            checksum: [0; 2],
        }
    }

    /// Scan `chunk`, returning every packet it completes, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<RawPacket> {
        let mut packets = Vec::new();
        for &byte in chunk {
            match self.state {
                ScanState::Idle => {
                    if byte == b'$' {
                        self.payload.clear();
                        self.state = ScanState::Payload;
                    }
                }
                ScanState::Payload => match byte {
                    b'#' => self.state = ScanState::Checksum(0),
                    b'$' => {
                        warn!(dropped = self.payload.len(), "packet restarted before '#'");
                        self.payload.clear();
                    }
                    _ if self.payload.len() >= MAX_PACKET_PAYLOAD => {
                        self.state = ScanState::Overflow(1);
                    }
                    _ => self.payload.push(byte),
                },
                ScanState::Overflow(skipped) => match byte {
                    b'#' => {
                        warn!(
                            kept = MAX_PACKET_PAYLOAD,
                            skipped, "truncated oversized packet"
                        );
                        self.state = ScanState::Checksum(0);
                    }
                    b'$' => {
                        warn!(
                            dropped = MAX_PACKET_PAYLOAD + skipped,
                            "oversized packet restarted before '#'"
                        );
                        self.payload.clear();
                        self.state = ScanState::Payload;
                    }
                    _ => self.state = ScanState::Overflow(skipped + 1),
                },
                ScanState::Checksum(0) => {
                    self.checksum[0] = byte;
                    self.state = ScanState::Checksum(1);
                }
                ScanState::Checksum(_) => {
                    self.checksum[1] = byte;
                    packets.push(RawPacket {
                        payload: std::mem::take(&mut self.payload),
                        checksum: self.checksum,
                    });
                    self.state = ScanState::Idle;
                }
            }
        }
        packets
    }

    /// True when a packet has started but not yet completed.
    pub fn in_packet(&self) -> bool {
        self.state != ScanState::Idle
    }
}
