//! A small `log::Log` implementation that prints `[LEVEL] message` lines to
//! stderr, colored by level when attached to a terminal and monochrome
//! otherwise.

use log::{Level, Log, Metadata, Record};
use std::io::Write;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

struct Logger {
    level: Level,
    use_color: bool,
}

fn color_for(level: Level) -> Color {
    match level {
        Level::Error => Color::Red,
        Level::Warn => Color::Yellow,
        Level::Info => Color::Green,
        Level::Debug => Color::Cyan,
        Level::Trace => Color::Blue,
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let color_choice = if self.use_color { ColorChoice::Auto } else { ColorChoice::Never };
        let mut stderr = StandardStream::stderr(color_choice);
        let _ = stderr.set_color(ColorSpec::new().set_fg(Some(color_for(record.level()))));
        let _ = writeln!(&mut stderr, "[{}] {}", record.level(), record.args());
        let _ = stderr.reset();
    }

    fn flush(&self) {}
}

/// Installs the logger at `level`, derived from a repeated `-v` CLI flag
/// rather than an environment variable, since this crate is meant to be
/// embedded as a library and its CLI binary shouldn't require env
/// configuration just to turn up its own verbosity.
pub fn init(level: Level) {
    let use_color = atty::is(atty::Stream::Stderr);
    let logger = Logger { level, use_color };
    let _ = log::set_boxed_logger(Box::new(logger));
    log::set_max_level(level.to_level_filter());
}

/// Maps a `-v` repeat count to a log level. Default (no flags) is `Warn`.
pub fn level_for_verbosity(count: u8) -> Level {
    match count {
        0 => Level::Warn,
        1 => Level::Info,
        2 => Level::Debug,
        _ => Level::Trace,
    }
}
