// Capture log sink
// Funnels observations from all session workers into one ordered stream

use crate::types::Observation;
use chrono::{DateTime, Local};
use std::fs::{self, File};
use std::io::Write;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Append-only sink for capture observations.
///
/// Every worker holds a clone of the sending half; a single writer task
/// drains the channel, which makes the output stream totally ordered
/// without the workers ever contending on a lock. Each observation is
/// written to stdout and, when it could be opened at startup, to a log
/// file named after the process start time.
pub struct CaptureSink {
    tx: UnboundedSender<Observation>,
}

impl CaptureSink {
    /// Create the sink and spawn its writer task.
    ///
    /// Failure to open the log file is not fatal: the sink degrades to
    /// stdout-only with a single warning.
    pub fn start() -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();

        let file = match open_log_file(Local::now()) {
            Ok(file) => Some(file),
            Err(e) => {
                log::warn!("could not open log file: {e}");
                None
            }
        };

        tokio::spawn(write_loop(rx, file));

        Arc::new(Self { tx })
    }

    /// Create a sink whose observations go to an in-process channel
    /// instead of stdout and disk. Used by tests to assert on the
    /// emitted stream.
    pub fn in_memory() -> (Arc<Self>, UnboundedReceiver<Observation>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }

    /// Append an observation to the stream.
    ///
    /// Safe to call from any task or from `Drop` implementations; the
    /// send never blocks. Once the writer task is gone (process
    /// shutdown) emissions are silently discarded.
    pub fn emit(&self, observation: Observation) {
        let _ = self.tx.send(observation);
    }
}

/// Log file path for a process started at `now`
pub fn log_file_name(now: DateTime<Local>) -> String {
    format!("logs/honeypot_logs_{}.log", now.format("%Y-%m-%d_%H-%M-%S"))
}

fn open_log_file(now: DateTime<Local>) -> std::io::Result<File> {
    fs::create_dir_all("logs")?;
    File::create(log_file_name(now))
}

async fn write_loop(mut rx: UnboundedReceiver<Observation>, mut file: Option<File>) {
    while let Some(obs) = rx.recv().await {
        println!("{} - {}", obs.timestamp.format("%H:%M:%S"), obs.message);

        if let Some(f) = file.as_mut() {
            let line = format!(
                "{} - {}\n",
                obs.timestamp.format("%Y-%m-%d %H:%M:%S"),
                obs.message
            );
            if f.write_all(line.as_bytes()).and_then(|_| f.flush()).is_err() {
                log::warn!("log file write failed, continuing on stdout only");
                file = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Observation, ServiceType, Severity};

    #[test]
    fn test_emission_preserves_order_and_fields() {
        let (sink, mut rx) = CaptureSink::in_memory();

        sink.emit(Observation::new(
            Severity::Info,
            ServiceType::Mysql,
            "10.0.0.1:5555",
            "first",
        ));
        sink.emit(
            Observation::new(Severity::Warning, ServiceType::Mysql, "10.0.0.1:5555", "second")
                .with_attr("query", "select 1"),
        );

        let first = rx.try_recv().unwrap();
        assert_eq!(first.message, "first");
        assert_eq!(first.severity, Severity::Info);

        let second = rx.try_recv().unwrap();
        assert_eq!(second.message, "second");
        assert_eq!(second.severity, Severity::Warning);
        assert_eq!(second.attr("query"), Some("select 1"));

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_log_file_name_embeds_timestamp() {
        use chrono::TimeZone;

        let when = Local.with_ymd_and_hms(2025, 3, 9, 14, 5, 2).unwrap();
        assert_eq!(
            log_file_name(when),
            "logs/honeypot_logs_2025-03-09_14-05-02.log"
        );
    }
}
