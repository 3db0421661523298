//! Logging setup: severity-filtered tracing with an optional
//! size-rotating file sink.
//!
//! Rotated files are named `<name>_%Y%m%d_%H-%M-%S.<N>.log` inside the
//! configured log directory; stdout logging stays on either way. The
//! filter honors `RUST_LOG` and defaults to `info`.

use crate::config::ServerConfig;
use chrono::Local;
use std::fs::{create_dir_all, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Initialize the global subscriber. Call once, before serving.
pub fn init(config: &ServerConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = tracing_subscriber::fmt::layer();
    let registry = tracing_subscriber::registry().with(filter).with(stdout_layer);

    if config.log_dir.is_empty() {
        registry.try_init()?;
    } else {
        let writer = RotatingWriter::create(
            Path::new(&config.log_dir),
            &config.name,
            config.rotation_size,
        )?;
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(writer);
        registry.with(file_layer).try_init()?;
    }
    Ok(())
}

struct RotateState {
    file: File,
    written: u64,
    index: u32,
}

/// Size-rotating log file writer.
#[derive(Clone)]
pub struct RotatingWriter {
    dir: PathBuf,
    base: String,
    max_size: u64,
    state: Arc<Mutex<RotateState>>,
}

impl RotatingWriter {
    /// Create the directory if needed and open the first file.
    pub fn create(dir: &Path, base: &str, max_size: u64) -> io::Result<Self> {
        create_dir_all(dir)?;
        let file = open_log_file(dir, base, 0)?;
        Ok(RotatingWriter {
            dir: dir.to_path_buf(),
            base: base.to_string(),
            max_size,
            state: Arc::new(Mutex::new(RotateState {
                file,
                written: 0,
                index: 0,
            })),
        })
    }
}

fn open_log_file(dir: &Path, base: &str, index: u32) -> io::Result<File> {
    let stamp = Local::now().format("%Y%m%d_%H-%M-%S");
    let name = format!("{base}_{stamp}.{index}.log");
    File::create(dir.join(name))
}

impl io::Write for RotatingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock().unwrap();
        if state.written + buf.len() as u64 > self.max_size {
            let index = state.index + 1;
            let file = open_log_file(&self.dir, &self.base, index)?;
            state.file = file;
            state.written = 0;
            state.index = index;
        }
        let n = io::Write::write(&mut state.file, buf)?;
        state.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        io::Write::flush(&mut state.file)
    }
}

impl<'a> MakeWriter<'a> for RotatingWriter {
    type Writer = RotatingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn rotates_at_size_threshold() {
        let dir = std::env::temp_dir().join(format!(
            "coserv-log-test-{}",
            crate::params::generate_random_string(8)
        ));
        let mut writer = RotatingWriter::create(&dir, "test", 64).unwrap();
        for _ in 0..8 {
            writer.write_all(&[b'x'; 24]).unwrap();
        }
        writer.flush().unwrap();

        let files: Vec<_> = std::fs::read_dir(&dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert!(files.len() > 1, "expected rotation, got {files:?}");
        assert!(files.iter().all(|f| f.starts_with("test_") && f.ends_with(".log")));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
