use crate::errors::FailoverResult;
use chrono::Local;
use env_logger::{Builder, Env, Target};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Writes every record to all sinks; a failing sink does not stop the others.
pub struct TeeWriter {
    sinks: Vec<Box<dyn Write + Send>>,
}

impl TeeWriter {
    pub fn new(sinks: Vec<Box<dyn Write + Send>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Box<dyn Write + Send>) {
        self.sinks.push(sink);
    }
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut last_err = None;
        let mut written = false;
        for sink in &mut self.sinks {
            match sink.write_all(buf) {
                Ok(()) => written = true,
                Err(e) => last_err = Some(e),
            }
        }
        match (written, last_err) {
            (false, Some(e)) => Err(e),
            _ => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        for sink in &mut self.sinks {
            sink.flush()?;
        }
        Ok(())
    }
}

/// Tee shared between the installed logger and its [`LogHandle`]
#[derive(Clone)]
struct SharedTee(Arc<Mutex<TeeWriter>>);

impl SharedTee {
    fn lock(&self) -> io::Result<MutexGuard<'_, TeeWriter>> {
        self.0
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log sink lock poisoned"))
    }
}

impl Write for SharedTee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lock()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.lock()?.flush()
    }
}

/// Adds sinks to the logger after it has been installed
pub struct LogHandle {
    tee: SharedTee,
}

impl LogHandle {
    fn with_sinks(sinks: Vec<Box<dyn Write + Send>>) -> Self {
        Self {
            tee: SharedTee(Arc::new(Mutex::new(TeeWriter::new(sinks)))),
        }
    }

    /// Append every following record to `path` as well.
    pub fn attach_file(&self, path: &Path) -> FailoverResult<()> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        self.tee.lock()?.push(Box::new(file));
        Ok(())
    }
}

/// Install the process-wide logger writing to stderr.
///
/// A log file is attached later through the returned handle, once the
/// process has the rights to open it. `RUST_LOG` overrides the default
/// `info` filter.
pub fn init() -> LogHandle {
    let handle = LogHandle::with_sinks(vec![Box::new(io::stderr())]);

    let mut builder = Builder::from_env(Env::default().default_filter_or("info"));
    builder.format(|buf, record| {
        writeln!(
            buf,
            "{} - {:<5} - {}",
            Local::now().format(TIMESTAMP_FORMAT),
            record.level(),
            record.args()
        )
    });
    builder.target(Target::Pipe(Box::new(handle.tee.clone())));
    builder.init();

    handle
}
