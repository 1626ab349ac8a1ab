//! Logcat parsing and streaming

pub mod lines;
pub mod parser;
pub mod stream;

pub use lines::LineBuffer;
pub use parser::{is_logcat_line, parse_line, parse_line_with_year};
pub use stream::{logcat_args, LogcatEvent, LogcatStream, LogcatSubscription};
