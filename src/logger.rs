use log::Level;

/// Sink for the diagnostics the device emits on failure paths.
pub trait Logger: Send + Sync {
    fn log(&self, level: Level, errno: Option<i32>, message: &str);
}

/// Forwards to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogLogger;

impl Logger for LogLogger {
    fn log(&self, level: Level, errno: Option<i32>, message: &str) {
        match errno {
            Some(errno) => log::log!(
                target: "tunpipe",
                level,
                "{} (errno {}: {})",
                message,
                errno,
                std::io::Error::from_raw_os_error(errno)
            ),
            None => log::log!(target: "tunpipe", level, "{}", message),
        }
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn log(&self, _level: Level, _errno: Option<i32>, _message: &str) {}
}
