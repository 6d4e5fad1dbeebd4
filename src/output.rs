use serde_json::Value;
use std::io::{self, Write};

/// Where results go. Implementations are driven by a single consumer, so
/// they never need their own locking.
pub trait Sink: Send {
    fn emit(&mut self, record: Value) -> io::Result<()>;
    /// Flushes whatever is buffered, called once after the last record
    fn finish(&mut self) -> io::Result<()>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Format {
    /// Newline delimited records instead of one collected document
    pub stream: bool,
    /// Compact instead of pretty-printed JSON
    pub compress: bool,
}

fn write_json<W: Write>(out: &mut W, value: &Value, compress: bool) -> io::Result<()> {
    if compress {
        serde_json::to_writer(&mut *out, value)?;
    } else {
        serde_json::to_writer_pretty(&mut *out, value)?;
    }
    out.write_all(b"\n")
}

/// Writes every record as soon as it is emitted
pub struct Streamed<W> {
    out: W,
    compress: bool,
}

impl<W: Write + Send> Streamed<W> {
    pub fn new(out: W, compress: bool) -> Self {
        Self { out, compress }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> Sink for Streamed<W> {
    fn emit(&mut self, record: Value) -> io::Result<()> {
        write_json(&mut self.out, &record, self.compress)?;
        self.out.flush()
    }

    fn finish(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

/// Collects every record and writes a single JSON array on finish
pub struct Aggregated<W> {
    out: W,
    compress: bool,
    records: Vec<Value>,
}

impl<W: Write + Send> Aggregated<W> {
    pub fn new(out: W, compress: bool) -> Self {
        Self {
            out,
            compress,
            records: Vec::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> Sink for Aggregated<W> {
    fn emit(&mut self, record: Value) -> io::Result<()> {
        self.records.push(record);
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        let records = Value::Array(std::mem::take(&mut self.records));
        write_json(&mut self.out, &records, self.compress)?;
        self.out.flush()
    }
}

impl Format {
    /// The sink for a batch or recursive run, chosen once up front
    pub fn sink<W: Write + Send + 'static>(self, out: W) -> Box<dyn Sink> {
        if self.stream {
            Box::new(Streamed::new(out, self.compress))
        } else {
            Box::new(Aggregated::new(out, self.compress))
        }
    }

    /// Writes the result of a single-mode call. Lists are split into
    /// records when streaming, anything else is written as one document.
    pub fn write_single<W: Write + Send>(self, out: W, value: Value) -> io::Result<()> {
        match value {
            Value::Array(items) if self.stream => {
                let mut sink = Streamed::new(out, self.compress);
                for item in items {
                    sink.emit(item)?;
                }
                sink.finish()
            }
            Value::Null => Ok(()),
            value => {
                let mut out = out;
                write_json(&mut out, &value, self.compress)?;
                out.flush()
            }
        }
    }
}
