//! Output stream fixtures

use enc_emit::{EmittedBody, OutputStreams};
use enc_metadata::{listing, MetadataDelta, MethodBody};
use std::io::{self, Write};

/// Three in-memory sinks for one delta
#[derive(Debug, Clone, Default)]
pub struct InMemoryStreams {
    pub metadata: Vec<u8>,
    pub il: Vec<u8>,
    pub debug: Vec<u8>,
}

impl InMemoryStreams {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn streams(&mut self) -> OutputStreams<'_> {
        OutputStreams::new(&mut self.metadata, &mut self.il, &mut self.debug)
    }

    /// Decode the metadata stream
    ///
    /// # Panics
    /// Panics if the stream is not a valid delta
    #[must_use]
    pub fn read_metadata(&self) -> MetadataDelta {
        MetadataDelta::read_from(&mut self.metadata.as_slice()).expect("valid metadata delta")
    }

    /// Debug stream lines as JSON values
    #[must_use]
    pub fn debug_lines(&self) -> Vec<serde_json::Value> {
        String::from_utf8_lossy(&self.debug)
            .lines()
            .map(|line| serde_json::from_str(line).expect("JSON debug line"))
            .collect()
    }

    /// Whether nothing was written
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty() && self.il.is_empty() && self.debug.is_empty()
    }
}

/// Decode the body at `offset` of an IL stream
///
/// # Panics
/// Panics if no valid body starts at `offset`
#[must_use]
pub fn body_at(il: &[u8], offset: u32) -> MethodBody {
    let start = usize::try_from(offset).expect("offset");
    MethodBody::decode(&il[start..]).expect("valid method body").0
}

/// Instruction listing of an emitted body, one instruction per line
///
/// # Panics
/// Panics if the body cannot be decoded
#[must_use]
pub fn il_listing(il: &[u8], body: &EmittedBody) -> Vec<String> {
    let code = body_at(il, body.offset).code;
    listing(&code)
        .expect("decodable IL")
        .lines()
        .map(str::to_owned)
        .collect()
}

/// Writer failing every write with `kind`
#[derive(Debug, Clone, Copy)]
pub struct FailingWriter {
    pub kind: io::ErrorKind,
}

impl FailingWriter {
    #[must_use]
    pub fn new(kind: io::ErrorKind) -> Self {
        Self { kind }
    }
}

impl Write for FailingWriter {
    fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
        Err(io::Error::new(self.kind, "disk full"))
    }

    fn flush(&mut self) -> io::Result<()> {
        Err(io::Error::new(self.kind, "disk full"))
    }
}
