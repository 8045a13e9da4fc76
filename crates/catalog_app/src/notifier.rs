use std::io::{self, Write};
use std::sync::Mutex;

use catalog_engine::Notifier;
use chrono::Utc;

/// Prints the end-of-session notification with a UTC timestamp.
///
/// The line goes straight to the console and not through the logger, so it
/// shows up exactly once whatever the log target is.
pub(crate) struct ConsoleNotifier<W = io::Stdout> {
    out: Mutex<W>,
}

impl ConsoleNotifier {
    pub(crate) fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> ConsoleNotifier<W> {
    pub(crate) fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }
}

impl<W: Write + Send> Notifier for ConsoleNotifier<W> {
    fn notify(&self, title: &str, message: &str) {
        let Ok(mut out) = self.out.lock() else {
            return;
        };
        let _ = writeln!(out, "[{}] {}: {}", Utc::now().to_rfc3339(), title, message);
        let _ = out.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_is_written_as_one_line() {
        let notifier = ConsoleNotifier::new(Vec::new());
        notifier.notify("Process finished", "2 files downloaded");

        let out = String::from_utf8(notifier.out.into_inner().unwrap()).unwrap();
        assert_eq!(out.lines().count(), 1);
        assert!(out.starts_with('['));
        assert!(out.ends_with("] Process finished: 2 files downloaded\n"));
    }
}
