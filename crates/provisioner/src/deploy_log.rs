//! Deployment log: an in-memory copy of every tracing event of the run,
//! flushed to `<timestamp>.<serial>.log` at checkpoints.

use macdeploy_common::{Result, Timestamp};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{warn, Subscriber};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, Layer};

/// Shared byte buffer the file layer writes into.
#[derive(Debug, Clone, Default)]
pub struct LogBuffer {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl LogBuffer {
    fn snapshot(&self) -> Vec<u8> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Tracing layer capturing every event at debug and above, without ANSI.
    pub fn layer<S>(&self) -> impl Layer<S> + Send + Sync + 'static
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(self.clone())
            .with_filter(LevelFilter::DEBUG)
    }
}

pub struct LogBufferWriter {
    inner: Arc<Mutex<Vec<u8>>>,
}

impl Write for LogBufferWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBufferWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogBufferWriter {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeploymentLog {
    file_name: String,
    directory: PathBuf,
    buffer: LogBuffer,
}

impl DeploymentLog {
    pub fn new(serial_tag: &str, directory: impl Into<PathBuf>) -> Self {
        Self::with_buffer(serial_tag, directory, LogBuffer::default())
    }

    /// Log backed by a buffer whose layer may already be installed, so
    /// events from before the serial tag was known are kept.
    pub fn with_buffer(serial_tag: &str, directory: impl Into<PathBuf>, buffer: LogBuffer) -> Self {
        Self {
            file_name: Timestamp::now().log_file_name(serial_tag),
            directory: directory.into(),
            buffer,
        }
    }

    /// Resolve the configured directory and make sure it exists, falling
    /// back to the default directory when it cannot be created.
    pub fn create(
        serial_tag: &str,
        configured: &str,
        home: &Path,
        cwd: &Path,
        buffer: LogBuffer,
    ) -> Self {
        let mut directory = resolve_log_directory(configured, home, cwd);
        if let Err(e) = fs::create_dir_all(&directory) {
            let fallback = default_log_directory(home);
            warn!(
                "Cannot create log directory {} ({}), using {}",
                directory.display(),
                e,
                fallback.display()
            );
            if let Err(e) = fs::create_dir_all(&fallback) {
                warn!("Cannot create log directory {}: {}", fallback.display(), e);
            }
            directory = fallback;
        }
        Self::with_buffer(serial_tag, directory, buffer)
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.file_name)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buffer.snapshot()).to_string()
    }

    /// Rewrite the log file with everything buffered so far.
    pub fn write_file(&self) -> Result<()> {
        fs::create_dir_all(&self.directory)?;
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(self.path())?;
        file.write_all(&self.buffer.snapshot())?;
        file.flush()?;
        Ok(())
    }

    pub fn layer<S>(&self) -> impl Layer<S> + Send + Sync + 'static
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        self.buffer.layer()
    }
}

pub fn default_log_directory(home: &Path) -> PathBuf {
    home.join("logs").join("macdeploy")
}

/// Turn the configured `log` value into a directory.
pub fn resolve_log_directory(configured: &str, home: &Path, cwd: &Path) -> PathBuf {
    let value = configured.trim().replace('\\', "/");
    if value.is_empty() {
        return default_log_directory(home);
    }
    if value == "/" {
        warn!("Refusing to write logs to /, using the default directory");
        return default_log_directory(home);
    }

    let mut path = if value == "~" {
        home.to_path_buf()
    } else if let Some(rest) = value.strip_prefix("~/") {
        home.join(rest)
    } else if value == "." || value == "./" {
        cwd.to_path_buf()
    } else {
        cwd.join(&value)
    };

    while path
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase().ends_with(".log"))
        .unwrap_or(false)
    {
        path.pop();
    }
    if path.as_os_str().is_empty() || path == Path::new("/") {
        return default_log_directory(home);
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tracing::info;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn test_resolve_log_directory() {
        let home = Path::new("/Users/admin");
        let cwd = Path::new("/tmp/bundle");
        let default = PathBuf::from("/Users/admin/logs/macdeploy");

        assert_eq!(resolve_log_directory("", home, cwd), default);
        assert_eq!(resolve_log_directory("  ", home, cwd), default);
        assert_eq!(resolve_log_directory("/", home, cwd), default);
        assert_eq!(
            resolve_log_directory("~/deploy-logs", home, cwd),
            PathBuf::from("/Users/admin/deploy-logs")
        );
        assert_eq!(resolve_log_directory("~", home, cwd), home.to_path_buf());
        assert_eq!(resolve_log_directory(".", home, cwd), cwd.to_path_buf());
        assert_eq!(
            resolve_log_directory("/var/log/macdeploy/run.log", home, cwd),
            PathBuf::from("/var/log/macdeploy")
        );
        assert_eq!(resolve_log_directory("/only.log", home, cwd), default);
        assert_eq!(
            resolve_log_directory("logs", home, cwd),
            PathBuf::from("/tmp/bundle/logs")
        );
    }

    #[test]
    fn test_file_name_carries_serial() {
        let log = DeploymentLog::new("C02XYZ", "/tmp");
        assert!(log.file_name().ends_with(".C02XYZ.log"));
        assert_eq!(log.path().parent(), Some(Path::new("/tmp")));
    }

    #[test]
    fn test_layer_captures_events_and_flushes() {
        let dir = TempDir::new().unwrap();
        let log = DeploymentLog::new("C02", dir.path().join("logs"));
        let subscriber = tracing_subscriber::registry().with(log.layer());
        tracing::subscriber::with_default(subscriber, || {
            info!("Created account john.smith");
            tracing::debug!("debug detail");
        });

        let contents = log.contents();
        assert!(contents.contains("Created account john.smith"));
        assert!(contents.contains("debug detail"));
        assert!(!contents.contains('\u{1b}'));

        log.write_file().unwrap();
        let on_disk = fs::read_to_string(log.path()).unwrap();
        assert_eq!(on_disk, contents);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(log.path()).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_create_falls_back_when_directory_is_unusable() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("file"), "x").unwrap();
        let buffer = LogBuffer::default();
        let subscriber = tracing_subscriber::registry().with(buffer.layer());

        let log = tracing::subscriber::with_default(subscriber, || {
            DeploymentLog::create("C02", "file/sub", dir.path(), dir.path(), buffer.clone())
        });

        assert_eq!(log.directory(), default_log_directory(dir.path()));
        assert!(log.directory().is_dir());
        assert!(log.contents().contains("Cannot create log directory"));
    }

    #[test]
    fn test_buffer_keeps_events_logged_before_the_log_exists() {
        let dir = TempDir::new().unwrap();
        let buffer = LogBuffer::default();
        let subscriber = tracing_subscriber::registry().with(buffer.layer());

        let log = tracing::subscriber::with_default(subscriber, || {
            tracing::warn!("Serial number lookup failed");
            DeploymentLog::with_buffer("UNKNOWN", dir.path(), buffer.clone())
        });

        assert!(log.contents().contains("Serial number lookup failed"));
    }
}
