use chrono::Local;
use log::{Metadata, Record};
use std::sync::{Mutex, OnceLock};

const MAX_LINES: usize = 1000;
const DRAIN_LINES: usize = 100;

static LOG_BUFFER: OnceLock<Mutex<Vec<String>>> = OnceLock::new();

fn log_buffer() -> &'static Mutex<Vec<String>> {
    LOG_BUFFER.get_or_init(|| Mutex::new(Vec::new()))
}

fn append_line(line: String) {
    if let Ok(mut buffer) = log_buffer().lock() {
        buffer.push(line);
        if buffer.len() > MAX_LINES {
            buffer.drain(0..DRAIN_LINES);
        }
    }
}

/// Lines captured since start-up (or the last [`clear_logs`]), oldest first.
pub fn recent_logs() -> Vec<String> {
    log_buffer().lock().map(|b| b.clone()).unwrap_or_default()
}

pub fn clear_logs() {
    if let Ok(mut buffer) = log_buffer().lock() {
        buffer.clear();
    }
}

/// Writes to stderr through env_logger and keeps a copy of every line in
/// memory for a front-end log panel.
pub struct DualLogger {
    env_logger: env_logger::Logger,
}

impl DualLogger {
    pub fn new(env_logger: env_logger::Logger) -> Self {
        Self { env_logger }
    }

    pub fn init() -> Result<(), log::SetLoggerError> {
        let env_logger = env_logger::Builder::from_default_env()
            .format_timestamp(Some(env_logger::fmt::TimestampPrecision::Seconds))
            .build();
        let max_level = env_logger.filter();

        log::set_boxed_logger(Box::new(DualLogger::new(env_logger)))?;
        log::set_max_level(max_level);
        Ok(())
    }
}

impl log::Log for DualLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.env_logger.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if !self.env_logger.matches(record) {
            return;
        }
        self.env_logger.log(record);

        append_line(format!(
            "[{}] {:5} {} - {}",
            Local::now().format("%H:%M:%S"),
            record.level(),
            record.target(),
            record.args()
        ));
    }

    fn flush(&self) {
        self.env_logger.flush();
    }
}
