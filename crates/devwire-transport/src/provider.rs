use std::fmt;

#[cfg(unix)]
use std::path::{Path, PathBuf};

use crate::error::{Result, TransportError};
use crate::traits::DuplexStream;

/// Opaque reference to an attached device (usually its UDID).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceRef(String);

impl DeviceRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceRef {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Capability that opens a named service on a device.
///
/// Pairing, trust and the underlying multiplexer live behind this trait;
/// the protocol layers only ever see the returned stream.
pub trait ServiceProvider {
    type Stream: DuplexStream;

    /// Open `service` on `device`, returning a connected duplex stream.
    fn open_service(&self, device: &DeviceRef, service: &str) -> Result<Self::Stream>;
}

impl<P: ServiceProvider + ?Sized> ServiceProvider for &P {
    type Stream = P::Stream;

    fn open_service(&self, device: &DeviceRef, service: &str) -> Result<Self::Stream> {
        (**self).open_service(device, service)
    }
}

/// Provider resolving services to socket files: `<root>/<device>/<service>.sock`.
#[cfg(unix)]
#[derive(Debug, Clone)]
pub struct UnixSocketProvider {
    root: PathBuf,
}

#[cfg(unix)]
impl UnixSocketProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Socket path for a device service.
    pub fn service_path(&self, device: &DeviceRef, service: &str) -> Result<PathBuf> {
        validate_component("device", device.id())?;
        validate_component("service", service)?;
        Ok(self
            .root
            .join(device.id())
            .join(format!("{service}.sock")))
    }
}

#[cfg(unix)]
impl ServiceProvider for UnixSocketProvider {
    type Stream = crate::traits::IpcStream;

    fn open_service(&self, device: &DeviceRef, service: &str) -> Result<Self::Stream> {
        let path = self.service_path(device, service)?;
        tracing::debug!(%device, service, ?path, "opening device service");
        crate::uds::UnixDomainSocket::connect(&path).map_err(|err| match err {
            TransportError::Connect { source, .. } => TransportError::Connect {
                target: format!("service {service} on device {device}"),
                source,
            },
            other => other,
        })
    }
}

// Names end up as path components, so separators and dot-segments are refused.
fn validate_component(kind: &'static str, name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if invalid {
        return Err(TransportError::InvalidName {
            kind,
            name: name.to_string(),
        });
    }
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use std::io::{Read, Write};

    use super::*;
    use crate::uds::UnixDomainSocket;

    #[test]
    fn service_path_layout() {
        let provider = UnixSocketProvider::new("/run/devwire");
        let path = provider
            .service_path(&DeviceRef::new("00008030-001A"), "com.apple.debugserver")
            .unwrap();
        assert_eq!(
            path,
            PathBuf::from("/run/devwire/00008030-001A/com.apple.debugserver.sock")
        );
    }

    #[test]
    fn rejects_traversal_names() {
        let provider = UnixSocketProvider::new("/run/devwire");
        for (device, service) in [("..", "svc"), ("dev", "../etc"), ("", "svc"), ("dev", "")] {
            let err = provider
                .service_path(&DeviceRef::new(device), service)
                .unwrap_err();
            assert!(matches!(err, TransportError::InvalidName { .. }));
        }
    }

    #[test]
    fn open_service_connects_to_socket() {
        let root = std::env::temp_dir().join(format!("devwire-prov-{}", std::process::id()));
        let device = DeviceRef::new("dev1");
        std::fs::create_dir_all(root.join(device.id())).unwrap();

        let provider = UnixSocketProvider::new(&root);
        let listener =
            UnixDomainSocket::bind(provider.service_path(&device, "echo").unwrap()).unwrap();

        let server = std::thread::spawn(move || {
            let mut stream = listener.accept().unwrap();
            let mut buf = [0u8; 2];
            stream.read_exact(&mut buf).unwrap();
            stream.write_all(&buf).unwrap();
        });

        let mut stream = provider.open_service(&device, "echo").unwrap();
        stream.write_all(b"hi").unwrap();
        let mut buf = [0u8; 2];
        stream.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hi");

        server.join().unwrap();
        let _ = std::fs::remove_dir_all(&root);
    }

    #[test]
    fn open_missing_service_is_connect_error() {
        let provider = UnixSocketProvider::new("/nonexistent-devwire-root");
        let err = provider
            .open_service(&DeviceRef::new("dev"), "svc")
            .unwrap_err();
        match err {
            TransportError::Connect { target, .. } => {
                assert_eq!(target, "service svc on device dev")
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
