//! Line-oriented diagnostic output for a board session.
//!
//! A session never fails because nobody is listening: every sink, including
//! [`no_print`], is a valid choice.

use log::info;

pub type Sink = Box<dyn Fn(&str)>;

/// Writes each line to standard output.
pub fn stdout_sink() -> Sink {
    Box::new(|line| println!("{}", line))
}

/// Discards everything.
pub fn no_print() -> Sink {
    Box::new(|_| ())
}

/// Forwards each line to the `log` facade.
pub fn log_sink() -> Sink {
    Box::new(|line| info!("{}", line))
}


#[cfg(test)]
mod tests {
    use super::*;
    use log::{Level, LevelFilter, Log, Metadata, Record};
    use std::sync::Mutex;

    struct Recorder(Mutex<Vec<(Level, String)>>);

    impl Log for Recorder {
        fn enabled(&self, _: &Metadata) -> bool {
            true
        }

        fn log(&self, record: &Record) {
            if let Ok(mut seen) = self.0.lock() {
                seen.push((record.level(), record.args().to_string()));
            }
        }

        fn flush(&self) {}
    }

    static RECORDER: Recorder = Recorder(Mutex::new(Vec::new()));

    #[test]
    fn log_sink_uses_info() {
        let _ = log::set_logger(&RECORDER);
        log::set_max_level(LevelFilter::Trace);

        log_sink()("Found ZeroBorg at 0x40.");

        let seen = RECORDER.0.lock().unwrap();
        assert!(seen.contains(&(Level::Info, "Found ZeroBorg at 0x40.".to_string())));
        assert!(!seen
            .iter()
            .any(|(level, line)| *level == Level::Warn && line.starts_with("Found ZeroBorg")));
    }

    #[test]
    fn no_print_accepts_anything() {
        no_print()("Loading ZeroBorg on bus 1, address 0x40.");
    }
}
