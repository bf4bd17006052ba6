use std::collections::VecDeque;
use std::io::{ErrorKind, Read, Write};

use bytes::BytesMut;
use devwire_plist::{Dictionary, Value};
use devwire_transport::{DeviceRef, DuplexStream, ServiceProvider};
use tracing::{debug, warn};

use crate::codec::{ChannelConfig, ReadStrategy};
use crate::completion::{device_error, is_complete, Progress};
use crate::error::{ChannelError, Result};
use crate::reader::read_frame;
use crate::stream::{StreamDecoder, StreamEvent};
use crate::writer::write_frame;

/// A property-list message channel over a duplex stream.
///
/// The channel exclusively owns its stream and accumulation buffer. Sends
/// are not internally synchronized; one writer at a time.
pub struct MessageChannel<S> {
    stream: S,
    config: ChannelConfig,
    decoder: StreamDecoder,
    pending: VecDeque<Value>,
    write_buf: BytesMut,
    discarded: bool,
}

impl<S: Read + Write> MessageChannel<S> {
    pub fn new(stream: S, config: ChannelConfig) -> Self {
        let decoder = StreamDecoder::new(config.format, config.max_payload_size);
        Self {
            stream,
            config,
            decoder,
            pending: VecDeque::new(),
            write_buf: BytesMut::new(),
            discarded: false,
        }
    }

    /// Encode `value` and write it as one frame.
    ///
    /// A failed write discards the channel: every later call returns
    /// [`ChannelError::Discarded`].
    pub fn send(&mut self, value: &Value) -> Result<()> {
        self.ensure_usable()?;
        let payload = devwire_plist::encode(value, self.config.format)?;
        if let Err(err) = write_frame(&mut self.stream, &mut self.write_buf, &payload) {
            if matches!(err, ChannelError::Write(_)) {
                warn!(error = %err, "write failed, discarding channel");
                self.discarded = true;
            }
            return Err(err);
        }
        debug!(len = payload.len(), format = %self.config.format, "sent message");
        Ok(())
    }

    /// Receive the next message using the configured [`ReadStrategy`].
    pub fn receive(&mut self) -> Result<Value> {
        self.ensure_usable()?;
        match self.config.read_strategy {
            ReadStrategy::Exchange => self.receive_exchange(),
            ReadStrategy::Streaming => loop {
                if let Some(value) = self.pending.pop_front() {
                    return Ok(value);
                }
                let values = self.read_chunk()?;
                self.pending.extend(values);
            },
        }
    }

    /// Return every message completed by the next inbound read.
    ///
    /// Messages already queued by an earlier [`receive`](Self::receive) are
    /// returned without reading. In exchange mode this yields exactly one
    /// message. The result may be empty when a read ends mid-frame.
    pub fn receive_chunk(&mut self) -> Result<Vec<Value>> {
        self.ensure_usable()?;
        match self.config.read_strategy {
            ReadStrategy::Exchange => Ok(vec![self.receive_exchange()?]),
            ReadStrategy::Streaming if !self.pending.is_empty() => {
                Ok(self.pending.drain(..).collect())
            }
            ReadStrategy::Streaming => self.read_chunk(),
        }
    }

    /// Send `value` and wait for the reply.
    pub fn request(&mut self, value: &Value) -> Result<Value> {
        self.send(value)?;
        self.receive()
    }

    /// Receive status dictionaries until one satisfies [`is_complete`].
    ///
    /// `on_progress` sees every status dictionary, the final one included.
    /// A dictionary carrying an `Error` field ends the wait with
    /// [`ChannelError::Device`]. Non-dictionary messages are skipped.
    pub fn wait_for_completion<F>(&mut self, mut on_progress: F) -> Result<Dictionary>
    where
        F: FnMut(&Progress),
    {
        loop {
            let value = self.receive()?;
            let done = is_complete(&value);
            let dict = match value {
                Value::Dictionary(dict) => dict,
                other => {
                    debug!(kind = other.kind(), "ignoring non-dictionary message");
                    continue;
                }
            };

            if let Some(err) = device_error(&dict) {
                return Err(err);
            }

            let progress = Progress::from_dictionary(&dict);
            debug!(status = %progress.status, percent = ?progress.percent, done, "progress");
            on_progress(&progress);
            if done {
                return Ok(dict);
            }
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// Consume the channel and return the stream.
    pub fn into_inner(self) -> S {
        self.stream
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.discarded {
            return Err(ChannelError::Discarded);
        }
        Ok(())
    }

    fn receive_exchange(&mut self) -> Result<Value> {
        let payload = read_frame(
            &mut self.stream,
            self.config.max_payload_size,
            self.config.read_chunk_size,
        )?;
        let value = devwire_plist::decode(&payload, self.config.format)?;
        debug!(len = payload.len(), "received message");
        Ok(value)
    }

    fn read_chunk(&mut self) -> Result<Vec<Value>> {
        let mut chunk = vec![0u8; self.config.read_chunk_size.max(1)];
        let read = loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => return Err(ChannelError::ConnectionClosed),
                Ok(n) => break n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(ChannelError::Io(err)),
            }
        };

        let values = self
            .decoder
            .push(&chunk[..read])
            .into_iter()
            .filter_map(|event| match event {
                StreamEvent::Message(value) => Some(value),
                StreamEvent::Malformed(_) => None,
            })
            .collect();
        Ok(values)
    }
}

impl<S: DuplexStream> MessageChannel<S> {
    /// Open `service` on `device` through `provider`.
    pub fn open<P>(
        provider: &P,
        device: &DeviceRef,
        service: &str,
        config: ChannelConfig,
    ) -> Result<Self>
    where
        P: ServiceProvider<Stream = S>,
    {
        let stream = provider.open_service(device, service)?;
        debug!(
            %device,
            service,
            format = %config.format,
            strategy = ?config.read_strategy,
            "opened channel"
        );
        Ok(Self::new(stream, config))
    }

    /// A handle that can shut the stream down from another thread.
    pub fn close_handle(&self) -> Result<CloseHandle<S>> {
        Ok(CloseHandle {
            stream: self.stream.try_clone_stream()?,
        })
    }

    /// Shut the stream down and drop the channel.
    pub fn close(self) -> Result<()> {
        self.stream.shutdown()?;
        Ok(())
    }
}

/// Closes a channel's stream; blocked receives observe `ConnectionClosed`.
pub struct CloseHandle<S> {
    stream: S,
}

impl<S: DuplexStream> CloseHandle<S> {
    pub fn close(&self) -> Result<()> {
        self.stream.shutdown()?;
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::io::Cursor;
    use std::time::Duration;

    use devwire_plist::Format;
    use devwire_transport::{IpcStream, UnixDomainSocket, UnixSocketProvider};

    use super::*;
    use crate::codec::encode_frame;

    /// Scripted inbound bytes, served at most `chunk` bytes per read.
    struct FakeStream {
        input: Cursor<Vec<u8>>,
        chunk: usize,
        output: Vec<u8>,
        fail_writes: bool,
    }

    impl FakeStream {
        fn new(input: Vec<u8>, chunk: usize) -> Self {
            Self {
                input: Cursor::new(input),
                chunk,
                output: Vec::new(),
                fail_writes: false,
            }
        }
    }

    impl Read for FakeStream {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = buf.len().min(self.chunk);
            self.input.read(&mut buf[..n])
        }
    }

    impl Write for FakeStream {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            if self.fail_writes {
                return Err(std::io::Error::from(ErrorKind::BrokenPipe));
            }
            self.output.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn frames(values: &[Value], format: Format) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for value in values {
            encode_frame(&devwire_plist::encode(value, format).unwrap(), &mut buf).unwrap();
        }
        buf.to_vec()
    }

    const PROLOG: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

    /// A device status frame, as XML the way a device would send it.
    fn status_frame(status: &str, percent: Option<i64>, complete: bool) -> Vec<u8> {
        let mut body = format!("<key>Status</key><string>{status}</string>");
        if complete {
            body.push_str("<key>Complete</key><true/>");
        }
        if let Some(percent) = percent {
            body.push_str(&format!("<key>PercentComplete</key><integer>{percent}</integer>"));
        }
        let xml = format!("{PROLOG}<plist version=\"1.0\"><dict>{body}</dict></plist>");
        let mut buf = BytesMut::new();
        encode_frame(xml.as_bytes(), &mut buf).unwrap();
        buf.to_vec()
    }

    fn command(name: &str) -> Value {
        Value::Dictionary([("Command", name)].into_iter().collect())
    }

    #[test]
    fn send_writes_length_prefixed_payload() {
        let mut channel =
            MessageChannel::new(FakeStream::new(Vec::new(), 64), ChannelConfig::default());
        channel.send(&command("Browse")).unwrap();

        let out = &channel.get_ref().output;
        let len = u32::from_be_bytes([out[0], out[1], out[2], out[3]]) as usize;
        assert_eq!(len, out.len() - 4);
        let decoded = devwire_plist::decode(&out[4..], Format::Xml).unwrap();
        assert_eq!(decoded, command("Browse"));
    }

    #[test]
    fn exchange_receive_across_small_reads() {
        let reply = command("Done");
        let stream = FakeStream::new(frames(&[reply.clone()], Format::Binary), 3);
        let config = ChannelConfig::default().with_format(Format::Binary);
        let mut channel = MessageChannel::new(stream, config);

        assert_eq!(channel.receive().unwrap(), reply);
        assert!(matches!(channel.receive(), Err(ChannelError::ConnectionClosed)));
    }

    #[test]
    fn exchange_receive_reports_decode_failure() {
        let mut wire = BytesMut::new();
        encode_frame(b"not a plist", &mut wire).unwrap();
        let mut channel =
            MessageChannel::new(FakeStream::new(wire.to_vec(), 64), ChannelConfig::default());

        assert!(matches!(channel.receive(), Err(ChannelError::Plist(_))));
    }

    #[test]
    fn streaming_receive_chunk_yields_all_completed() {
        let values = vec![command("a"), command("b"), command("c")];
        let stream = FakeStream::new(frames(&values, Format::Xml), 1 << 16);
        let config = ChannelConfig::default().with_read_strategy(ReadStrategy::Streaming);
        let mut channel = MessageChannel::new(stream, config);

        assert_eq!(channel.receive_chunk().unwrap(), values);
        assert!(matches!(channel.receive_chunk(), Err(ChannelError::ConnectionClosed)));
    }

    #[test]
    fn streaming_receive_skips_malformed_frames() {
        let mut wire = BytesMut::new();
        encode_frame(b"<plist><bogus/></plist>", &mut wire).unwrap();
        wire.extend_from_slice(&frames(&[command("after")], Format::Xml));

        for chunk in [1, 5, 4096] {
            let config = ChannelConfig::default().with_read_strategy(ReadStrategy::Streaming);
            let mut channel = MessageChannel::new(FakeStream::new(wire.to_vec(), chunk), config);
            assert_eq!(channel.receive().unwrap(), command("after"), "chunk {chunk}");
        }
    }

    #[test]
    fn streaming_receive_queues_extra_messages() {
        let values = vec![command("one"), command("two")];
        let config = ChannelConfig::default().with_read_strategy(ReadStrategy::Streaming);
        let stream = FakeStream::new(frames(&values, Format::Xml), 4096);
        let mut channel = MessageChannel::new(stream, config);

        assert_eq!(channel.receive().unwrap(), values[0]);
        assert_eq!(channel.receive_chunk().unwrap(), vec![values[1].clone()]);
    }

    #[test]
    fn wait_for_completion_reports_progress() {
        let script = [
            status_frame("CreatingStagingDirectory", Some(5), false),
            frames(&[Value::from("noise")], Format::Xml),
            status_frame("CopyingFile", Some(40), true),
            status_frame("Complete", None, true),
        ]
        .concat();
        for strategy in [ReadStrategy::Exchange, ReadStrategy::Streaming] {
            let config = ChannelConfig::default().with_read_strategy(strategy);
            let mut channel = MessageChannel::new(FakeStream::new(script.clone(), 7), config);

            let mut seen = Vec::new();
            let last = channel
                .wait_for_completion(|p| seen.push((p.status.clone(), p.percent)))
                .unwrap();

            assert_eq!(last.get("Status").and_then(Value::as_text), Some("Complete"));
            assert_eq!(
                seen,
                vec![
                    ("CreatingStagingDirectory".to_string(), Some(5)),
                    ("CopyingFile".to_string(), Some(40)),
                    ("Complete".to_string(), None),
                ],
                "{strategy:?}"
            );
        }
    }

    #[test]
    fn wait_for_completion_surfaces_device_error() {
        let mut error = Dictionary::new();
        error.insert("Error", "APIInternalError");
        error.insert("ErrorDescription", "disk full");
        let mut script = status_frame("Copying", Some(10), false);
        script.extend(frames(&[Value::Dictionary(error)], Format::Xml));
        let mut channel =
            MessageChannel::new(FakeStream::new(script, 64), ChannelConfig::default());

        let err = channel.wait_for_completion(|_| {}).unwrap_err();
        match err {
            ChannelError::Device { error, description } => {
                assert_eq!(error, "APIInternalError");
                assert_eq!(description.as_deref(), Some("disk full"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn wait_for_completion_stream_closed() {
        let script = status_frame("Copying", Some(10), false);
        let mut channel =
            MessageChannel::new(FakeStream::new(script, 64), ChannelConfig::default());
        assert!(matches!(
            channel.wait_for_completion(|_| {}),
            Err(ChannelError::ConnectionClosed)
        ));
    }

    #[test]
    fn write_failure_discards_channel() {
        let mut stream = FakeStream::new(frames(&[command("x")], Format::Xml), 64);
        stream.fail_writes = true;
        let mut channel = MessageChannel::new(stream, ChannelConfig::default());

        assert!(matches!(channel.send(&command("x")), Err(ChannelError::Write(_))));
        assert!(matches!(channel.send(&command("x")), Err(ChannelError::Discarded)));
        assert!(matches!(channel.receive(), Err(ChannelError::Discarded)));
    }

    #[test]
    fn unsupported_value_does_not_discard() {
        let mut channel =
            MessageChannel::new(FakeStream::new(Vec::new(), 64), ChannelConfig::default());
        assert!(matches!(channel.send(&Value::Integer(1)), Err(ChannelError::Plist(_))));
        channel.send(&command("ok")).unwrap();
    }

    #[test]
    fn request_reply_over_socket_pair() {
        let (left, right) = IpcStream::pair().unwrap();
        let server = std::thread::spawn(move || {
            let mut peer = MessageChannel::new(right, ChannelConfig::default());
            let request = peer.receive().unwrap();
            let mut reply = request.into_dictionary().unwrap();
            reply.insert("Status", "Complete");
            peer.send(&Value::Dictionary(reply)).unwrap();
        });

        let mut channel = MessageChannel::new(left, ChannelConfig::default());
        let reply = channel.request(&command("Lookup")).unwrap();
        let reply = reply.as_dictionary().unwrap();
        assert_eq!(reply.get("Command").and_then(Value::as_text), Some("Lookup"));
        assert_eq!(reply.get("Status").and_then(Value::as_text), Some("Complete"));

        server.join().unwrap();
    }

    #[test]
    fn close_handle_unblocks_exchange_receive() {
        let (left, _right) = IpcStream::pair().unwrap();
        let mut channel = MessageChannel::new(left, ChannelConfig::default());
        let handle = channel.close_handle().unwrap();

        let closer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            handle.close().unwrap();
        });

        assert!(matches!(channel.receive(), Err(ChannelError::ConnectionClosed)));
        closer.join().unwrap();
    }

    #[test]
    fn open_through_provider() {
        let root = std::env::temp_dir().join(format!("devwire-chan-{}", std::process::id()));
        let device = DeviceRef::new("dev1");
        std::fs::create_dir_all(root.join(device.id())).unwrap();
        let provider = UnixSocketProvider::new(&root);
        let listener =
            UnixDomainSocket::bind(provider.service_path(&device, "installer").unwrap()).unwrap();

        let server = std::thread::spawn(move || {
            let stream = listener.accept().unwrap();
            let mut peer = MessageChannel::new(stream, ChannelConfig::default());
            let _ = peer.receive().unwrap();
            let done = status_frame("Complete", None, true);
            peer.get_mut().write_all(&done).unwrap();
        });

        let config = ChannelConfig::default();
        let mut channel = MessageChannel::open(&provider, &device, "installer", config).unwrap();
        channel.send(&command("Install")).unwrap();
        assert!(channel.wait_for_completion(|_| {}).is_ok());
        channel.close().unwrap();

        server.join().unwrap();
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn open_missing_service_is_transport_error() {
        let provider = UnixSocketProvider::new("/nonexistent-devwire-root");
        let device = DeviceRef::new("dev");
        let err = MessageChannel::open(&provider, &device, "svc", ChannelConfig::default())
            .err()
            .unwrap();
        assert!(matches!(err, ChannelError::Transport(_)));
    }
}
