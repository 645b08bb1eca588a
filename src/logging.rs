use std::fs::OpenOptions;
use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};

use crate::error::CurateError;

/// Process-wide logging set up once by the binary. Events go to stderr and,
/// when a directory is given, are appended to `<dir>/<name>.log`.
#[derive(Debug, Clone)]
pub struct LogContext {
    log_file: Option<Utf8PathBuf>,
}

impl LogContext {
    pub fn init(log_dir: Option<&Utf8Path>, name: &str) -> Result<Self, CurateError> {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        let (writer, log_file, ansi) = match log_dir {
            Some(dir) => {
                std::fs::create_dir_all(dir.as_std_path())
                    .map_err(|err| CurateError::Filesystem(format!("create {dir}: {err}")))?;
                let path = dir.join(format!("{name}.log"));
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path.as_std_path())
                    .map_err(|err| CurateError::Filesystem(format!("open {path}: {err}")))?;
                let writer = BoxMakeWriter::new(std::io::stderr.and(Mutex::new(file)));
                (writer, Some(path), false)
            }
            None => (BoxMakeWriter::new(std::io::stderr), None, true),
        };

        // A second init in the same process keeps the first subscriber.
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_ansi(ansi)
            .with_writer(writer)
            .try_init();

        Ok(Self { log_file })
    }

    pub fn log_file(&self) -> Option<&Utf8Path> {
        self.log_file.as_deref()
    }
}
