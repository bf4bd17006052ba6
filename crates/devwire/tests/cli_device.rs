#![cfg(all(unix, feature = "cli"))]

use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::{Command, Output};
use std::thread;

use bytes::BytesMut;
use devwire::frame::{encode_frame, ChannelConfig, ChannelError, MessageChannel, Value};
use devwire::transport::{DeviceRef, IpcStream, UnixDomainSocket, UnixSocketProvider};

const DEVICE: &str = "dev0";

struct FakeDevice {
    root: PathBuf,
    listener: UnixDomainSocket,
}

impl FakeDevice {
    fn bind(tag: &str, service: &str) -> Self {
        let root = PathBuf::from(format!(
            "/tmp/devwire-dev-{tag}-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(root.join(DEVICE)).expect("device dir should be creatable");
        let path = UnixSocketProvider::new(&root)
            .service_path(&DeviceRef::new(DEVICE), service)
            .expect("valid service path");
        let listener = UnixDomainSocket::bind(path).expect("bind should succeed");
        Self { root, listener }
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_devwire"))
            .arg("--service-root")
            .arg(&self.root)
            .args(["--log-level", "error", "--format", "json"])
            .args(args)
            .output()
            .expect("devwire should run")
    }
}

impl Drop for FakeDevice {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

/// One device-side XML dictionary, framed for the wire.
fn xml_frame(dict_body: &str) -> Vec<u8> {
    let xml = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\
         <plist version=\"1.0\"><dict>{dict_body}</dict></plist>"
    );
    let mut frame = BytesMut::new();
    encode_frame(xml.as_bytes(), &mut frame).expect("frame should encode");
    frame.to_vec()
}

fn progress(status: &str, percent: i64) -> Vec<u8> {
    xml_frame(&format!(
        "<key>Status</key><string>{status}</string>\
         <key>PercentComplete</key><integer>{percent}</integer>"
    ))
}

fn complete() -> Vec<u8> {
    xml_frame("<key>Status</key><string>Complete</string><key>Complete</key><true/>")
}

fn json_lines(output: &Output) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("each line should be JSON"))
        .collect()
}

fn field(value: &Value, key: &str) -> Option<String> {
    value
        .as_dictionary()?
        .get(key)
        .and_then(Value::as_text)
        .map(str::to_string)
}

/// Block until the client hangs up.
fn wait_for_hangup(channel: &mut MessageChannel<IpcStream>) {
    assert!(matches!(channel.receive(), Err(ChannelError::ConnectionClosed)));
}

#[test]
fn send_with_wait_prints_reply() {
    let device = FakeDevice::bind("send", "lockdown");
    let listener = &device.listener;

    let output = thread::scope(|s| {
        let server = s.spawn(|| {
            let stream = listener.accept().expect("accept should succeed");
            let mut channel = MessageChannel::new(stream, ChannelConfig::default());
            let request = channel.receive().expect("request should arrive");
            assert_eq!(field(&request, "Request").as_deref(), Some("GetValue"));
            assert_eq!(field(&request, "Key").as_deref(), Some("ProductVersion"));

            let reply = xml_frame(
                "<key>Key</key><string>ProductVersion</string>\
                 <key>Value</key><string>17.4</string>",
            );
            channel.get_mut().write_all(&reply).expect("reply should send");
        });

        let output = device.run(&[
            "send",
            DEVICE,
            "lockdown",
            "-f",
            "Request=GetValue",
            "-f",
            "Key=ProductVersion",
            "--wait",
        ]);
        server.join().expect("server thread should finish");
        output
    });

    assert_eq!(output.status.code(), Some(0), "{output:?}");
    let lines = json_lines(&output);
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["device"], DEVICE);
    assert_eq!(lines[0]["service"], "lockdown");
    assert_eq!(lines[0]["message"]["Value"], "17.4");
}

#[test]
fn send_wait_times_out() {
    let device = FakeDevice::bind("timeout", "lockdown");
    let listener = &device.listener;

    let output = thread::scope(|s| {
        let server = s.spawn(|| {
            let stream = listener.accept().expect("accept should succeed");
            let mut channel = MessageChannel::new(stream, ChannelConfig::default());
            channel.receive().expect("request should arrive");
            wait_for_hangup(&mut channel);
        });

        let output = device.run(&[
            "send",
            DEVICE,
            "lockdown",
            "-f",
            "Request=QueryType",
            "--wait",
            "--wait-timeout",
            "200ms",
        ]);
        server.join().expect("server thread should finish");
        output
    });

    assert_eq!(output.status.code(), Some(124), "{output:?}");
}

#[test]
fn send_to_missing_service_is_transport_error() {
    let device = FakeDevice::bind("missing", "present");
    let output = device.run(&["send", DEVICE, "absent", "-f", "Request=QueryType"]);
    assert_eq!(output.status.code(), Some(3), "{output:?}");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("service absent on device dev0"), "stderr: {stderr}");
}

#[test]
fn send_rejects_path_like_service_names() {
    let device = FakeDevice::bind("badname", "present");
    let output = device.run(&["send", DEVICE, "..", "-f", "Request=QueryType"]);
    assert_eq!(output.status.code(), Some(64), "{output:?}");
}

#[test]
fn watch_prints_progress_until_complete() {
    let device = FakeDevice::bind("watch", "installer");
    let listener = &device.listener;

    let output = thread::scope(|s| {
        let server = s.spawn(|| {
            let stream = listener.accept().expect("accept should succeed");
            let mut channel = MessageChannel::new(stream, ChannelConfig::default());
            let request = channel.receive().expect("request should arrive");
            assert_eq!(field(&request, "Command").as_deref(), Some("Install"));

            // Two updates in one write, the rest split mid-frame.
            let mut wire = progress("CreatingStagingDirectory", 5);
            wire.extend(progress("CopyingFile", 50));
            wire.extend(xml_frame(
                "<key>Status</key><string>VerifyingApplication</string>\
                 <key>Complete</key><true/>\
                 <key>PercentComplete</key><integer>90</integer>",
            ));
            wire.extend(complete());
            let split = wire.len() - 10;
            let stream = channel.get_mut();
            stream.write_all(&wire[..split]).expect("write should succeed");
            stream.flush().expect("flush should succeed");
            thread::sleep(std::time::Duration::from_millis(50));
            stream.write_all(&wire[split..]).expect("write should succeed");
            wait_for_hangup(&mut channel);
        });

        let output = device.run(&["watch", DEVICE, "installer", "--field", "Command=Install"]);
        server.join().expect("server thread should finish");
        output
    });

    assert_eq!(output.status.code(), Some(0), "{output:?}");
    let lines = json_lines(&output);
    let statuses: Vec<_> = lines
        .iter()
        .map(|line| line["message"]["Status"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(
        statuses,
        vec!["CreatingStagingDirectory", "CopyingFile", "VerifyingApplication", "Complete"]
    );
    assert_eq!(lines[1]["message"]["PercentComplete"], 50);
}

#[test]
fn watch_stops_after_count() {
    let device = FakeDevice::bind("count", "installer");
    let listener = &device.listener;

    let output = thread::scope(|s| {
        let server = s.spawn(|| {
            let stream = listener.accept().expect("accept should succeed");
            let mut channel = MessageChannel::new(stream, ChannelConfig::default());
            let mut wire = progress("ExtractingPackage", 15);
            wire.extend(progress("InspectingPackage", 20));
            wire.extend(progress("CopyingFile", 50));
            channel.get_mut().write_all(&wire).expect("write should succeed");
            wait_for_hangup(&mut channel);
        });

        let output = device.run(&["watch", DEVICE, "installer", "--count", "2"]);
        server.join().expect("server thread should finish");
        output
    });

    assert_eq!(output.status.code(), Some(0), "{output:?}");
    assert_eq!(json_lines(&output).len(), 2);
}

#[test]
fn watch_fails_on_device_error() {
    let device = FakeDevice::bind("error", "installer");
    let listener = &device.listener;

    let output = thread::scope(|s| {
        let server = s.spawn(|| {
            let stream = listener.accept().expect("accept should succeed");
            let mut channel = MessageChannel::new(stream, ChannelConfig::default());
            let mut wire = progress("InspectingPackage", 20);
            wire.extend(xml_frame(
                "<key>Error</key><string>ApplicationVerificationFailed</string>\
                 <key>ErrorDescription</key><string>bad signature</string>",
            ));
            channel.get_mut().write_all(&wire).expect("write should succeed");
            wait_for_hangup(&mut channel);
        });

        let output = device.run(&["watch", DEVICE, "installer"]);
        server.join().expect("server thread should finish");
        output
    });

    assert_eq!(output.status.code(), Some(1), "{output:?}");
    assert_eq!(json_lines(&output).len(), 2);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("device reported ApplicationVerificationFailed: bad signature"),
        "stderr: {stderr}"
    );
}

/// Read until `marker` has been seen, returning everything received.
fn read_until(stream: &mut IpcStream, marker: &[u8]) -> Vec<u8> {
    let mut seen = Vec::new();
    let mut chunk = [0u8; 256];
    while !seen.windows(marker.len()).any(|w| w == marker) {
        let n = stream.read(&mut chunk).expect("read should succeed");
        assert!(n > 0, "client hung up early: {:?}", String::from_utf8_lossy(&seen));
        seen.extend_from_slice(&chunk[..n]);
    }
    seen
}

#[test]
fn debug_launches_and_relays_console_output() {
    let device = FakeDevice::bind("debug", "com.apple.debugserver");
    let listener = &device.listener;

    let output = thread::scope(|s| {
        let server = s.spawn(|| {
            let mut stream = listener.accept().expect("accept should succeed");
            let handshake = read_until(&mut stream, b"$vCont;c#a8");
            let text = String::from_utf8(handshake).expect("handshake is ASCII");
            assert!(text.starts_with("$QStartNoAckMode#b0+"), "{text}");
            assert!(text.contains("$QSetDisableASLR:1#"), "{text}");
            assert!(text.contains("$A16,0,2f62696e2f617070,4,1,2d76#"), "{text}");

            // "hello wor" and "ld\n", with a non-console reply in between.
            stream
                .write_all(b"$OK#9a$O68656c6c6f20776f72#00$O6c640a#00")
                .expect("write should succeed");
        });

        let output = device.run(&["debug", DEVICE, "--", "/bin/app", "-v"]);
        server.join().expect("server thread should finish");
        output
    });

    assert_eq!(output.status.code(), Some(0), "{output:?}");
    assert_eq!(String::from_utf8_lossy(&output.stdout), "hello world\n");
}

#[test]
fn debug_launch_only_detaches() {
    let device = FakeDevice::bind("detach", "com.apple.debugserver");
    let listener = &device.listener;

    let output = thread::scope(|s| {
        let server = s.spawn(|| {
            let mut stream = listener.accept().expect("accept should succeed");
            let handshake = read_until(&mut stream, b"$D#44");
            let text = String::from_utf8(handshake).expect("handshake is ASCII");
            assert!(!text.contains("vCont"), "{text}");
        });

        let output = device.run(&["debug", DEVICE, "--launch-only", "--", "/bin/app"]);
        server.join().expect("server thread should finish");
        output
    });

    assert_eq!(output.status.code(), Some(0), "{output:?}");
    assert!(output.stdout.is_empty());
}

#[test]
fn debug_exits_when_process_is_killed() {
    let device = FakeDevice::bind("kill", "com.apple.debugserver");
    let listener = &device.listener;

    let output = thread::scope(|s| {
        let server = s.spawn(|| {
            let mut stream = listener.accept().expect("accept should succeed");
            read_until(&mut stream, b"$vCont;c#a8");
            stream
                .write_all(b"$O6f6b0a#00$T09thread:1;#00")
                .expect("write should succeed");
            let mut rest = Vec::new();
            let _ = stream.read_to_end(&mut rest);
        });

        let output = device.run(&["debug", DEVICE, "--", "/bin/app"]);
        server.join().expect("server thread should finish");
        output
    });

    assert_eq!(output.status.code(), Some(137), "{output:?}");
    assert_eq!(String::from_utf8_lossy(&output.stdout), "ok\n");
}
