//! Fake device: serves an installer-style progress service on a local
//! socket so the CLI can be tried without hardware.
//!
//! Run with:
//!   cargo run --example fake-device
//!
//! In another terminal (using the root printed on startup):
//!   cargo run --features cli -- --service-root <ROOT> \
//!     watch fake0 installer --field Command=Install

use std::fs;
use std::io::Write;
use std::thread;
use std::time::Duration;

use bytes::BytesMut;
use devwire::frame::{encode_frame, ChannelConfig, MessageChannel, ReadStrategy};
use devwire::transport::{DeviceRef, UnixDomainSocket, UnixSocketProvider};

const STEPS: &[(&str, i64)] = &[
    ("CreatingStagingDirectory", 5),
    ("ExtractingPackage", 15),
    ("InspectingPackage", 20),
    ("CopyingFile", 50),
    ("GeneratingApplicationMap", 90),
];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let root = std::env::temp_dir().join(format!("devwire-fake-{}", std::process::id()));
    let device = DeviceRef::new("fake0");
    fs::create_dir_all(root.join(device.id()))?;

    let provider = UnixSocketProvider::new(&root);
    let listener = UnixDomainSocket::bind(provider.service_path(&device, "installer")?)?;
    eprintln!("Serving {device}/installer under {}", root.display());

    let stream = listener.accept()?;
    let config = ChannelConfig::default().with_read_strategy(ReadStrategy::Exchange);
    let mut channel = MessageChannel::new(stream, config);

    let request = channel.receive()?;
    eprintln!("Request: {request:?}");

    // Status updates carry integers and booleans, which only a device
    // emits, so they go out as hand-written XML.
    for (status, percent) in STEPS {
        let body = format!(
            "<key>Status</key><string>{status}</string>\
             <key>PercentComplete</key><integer>{percent}</integer>"
        );
        send_xml(&mut channel, &body)?;
        thread::sleep(Duration::from_millis(200));
    }
    send_xml(
        &mut channel,
        "<key>Status</key><string>Complete</string><key>Complete</key><true/>",
    )?;

    let _ = fs::remove_dir_all(&root);
    Ok(())
}

const PROLOG: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

fn send_xml<S: Write + std::io::Read>(
    channel: &mut MessageChannel<S>,
    dict_body: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let xml = format!(r#"{PROLOG}<plist version="1.0"><dict>{dict_body}</dict></plist>"#);
    let mut frame = BytesMut::new();
    encode_frame(xml.as_bytes(), &mut frame)?;
    channel.get_mut().write_all(&frame)?;
    Ok(())
}
