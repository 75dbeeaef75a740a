//! Log writer behind the `log` facade.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use log::{Level, LevelFilter, Log, Metadata, Record};

/// Writes records to stderr or an append-only log file.
struct WriterLogger {
    file: Option<Mutex<std::fs::File>>,
    level: LevelFilter,
}

impl Log for WriterLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!(
            "{:<5} {}: {}\n",
            record.level(),
            record.target(),
            record.args()
        );
        match &self.file {
            Some(file) => {
                if let Ok(mut file) = file.lock() {
                    let _ = file.write_all(line.as_bytes());
                }
            }
            None => {
                let _ = std::io::stderr().write_all(line.as_bytes());
            }
        }
    }

    fn flush(&self) {
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
    }
}

/// Install the logger. `verbosity` 0 = warn, 1 = info, 2 = debug, 3+ = trace.
pub fn init(verbosity: u8, log_file: Option<&Path>) {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let file = log_file.and_then(|path| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map(Mutex::new)
            .ok()
    });
    if log::set_boxed_logger(Box::new(WriterLogger { file, level })).is_ok() {
        log::set_max_level(level);
    }
}

/// Level shown for a record, exposed for tests.
pub fn level_for(verbosity: u8) -> Level {
    match verbosity {
        0 => Level::Warn,
        1 => Level::Info,
        2 => Level::Debug,
        _ => Level::Trace,
    }
}

#[cfg(test)]
mod tests {
    use super::level_for;
    use log::Level;

    #[test]
    fn verbosity_maps_to_levels() {
        assert_eq!(level_for(0), Level::Warn);
        assert_eq!(level_for(1), Level::Info);
        assert_eq!(level_for(2), Level::Debug);
        assert_eq!(level_for(9), Level::Trace);
    }
}
