use serde::{Deserialize, Serialize};
use serde_json::ser::Formatter;
use std::io;

use crate::error::Result;

pub const CONTROL_KIND: &str = "control";
pub const CONTROL_SCHEMA_VERSION: u32 = 1;

// One control sample as it goes over the wire
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ControlFrame {
    pub kind: String,
    pub schema_version: u32,
    pub control_x: f64,
}

impl ControlFrame {
    pub fn new(control_x: f64) -> Self {
        Self {
            kind: CONTROL_KIND.to_string(),
            schema_version: CONTROL_SCHEMA_VERSION,
            control_x,
        }
    }

    /// Encode as a JSON text message, e.g.
    /// `{"kind": "control", "schema_version": 1, "control_x": 0.5}`.
    pub fn to_text(&self) -> Result<String> {
        let mut buf = Vec::with_capacity(64);
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, SpacedFormatter);
        self.serialize(&mut ser)?;
        let text = String::from_utf8(buf)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(text)
    }
}

/// Compact JSON with a space after every `,` and `:`.
pub struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}
