use crate::error::Result;

/// A consumer of inbound stream chunks.
pub trait ChunkSink {
    fn accept(&mut self, chunk: &[u8]) -> Result<()>;
}

/// Fans each inbound chunk out to every registered sink.
///
/// Sinks see identical bytes, in registration order; none of them consumes
/// the stream on behalf of the others.
#[derive(Default)]
pub struct Tee<'a> {
    sinks: Vec<&'a mut dyn ChunkSink>,
}

impl<'a> Tee<'a> {
    pub fn new() -> Self {
        Self { sinks: Vec::new() }
    }

    pub fn register(mut self, sink: &'a mut dyn ChunkSink) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Deliver `chunk` to each sink; stops at the first failing sink.
    pub fn dispatch(&mut self, chunk: &[u8]) -> Result<()> {
        for sink in self.sinks.iter_mut() {
            sink.accept(chunk)?;
        }
        Ok(())
    }
}
