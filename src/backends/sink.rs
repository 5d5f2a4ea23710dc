use std::io::Write;

use parking_lot::Mutex;

use crate::error::Result;

/// Log target every rendered metrics line is emitted under.
pub const METRICS_TARGET: &str = "metrics";

/// Where rendered metric lines end up.
pub trait LineSink: Send + Sync {
    fn write_line(&self, line: &str) -> Result<()>;
}

/// Emits each line as an `info` event on the `metrics` log target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl LineSink for LogSink {
    fn write_line(&self, line: &str) -> Result<()> {
        tracing::info!(target: METRICS_TARGET, "{line}");
        Ok(())
    }
}

/// Writes newline-terminated lines to any `Write` (stdout, a file, a socket).
pub struct WriterSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

impl<W: Write + Send> LineSink for WriterSink<W> {
    fn write_line(&self, line: &str) -> Result<()> {
        let mut w = self.writer.lock();
        writeln!(w, "{line}")?;
        w.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;
    use crate::error::MetricsError;

    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn writer_sink_appends_newlines() {
        let sink = WriterSink::new(Vec::new());
        sink.write_line("a").unwrap();
        sink.write_line("b").unwrap();
        assert_eq!(sink.into_inner(), b"a\nb\n");
    }

    #[test]
    fn writer_failure_is_render_failure() {
        let sink = WriterSink::new(Broken);
        assert!(matches!(
            sink.write_line("x"),
            Err(MetricsError::RenderFailure(_))
        ));
    }
}
