//! Pattern layout turning log calls into text.
//!
//! The template is parsed once into segments, so formatting a call is a
//! single pass with no re-parsing. Supported converters:
//!
//! | converter | output |
//! |---|---|
//! | `%d`, `%d{pattern}` | timestamp; pattern tokens `yyyy MM dd HH mm ss SSS XXX` |
//! | `%p` | level |
//! | `%c` | logger name |
//! | `%C` | origin of the call, empty for direct calls |
//! | `%t` | thread name |
//! | `%m` | message |
//! | `%n` | newline |
//! | `%X{key}` | logger context: `space`, `namespace`, `operation_id`, `correlation_id`, `activity_id`, `channel` |
//! | `%%` | a literal `%` |
//!
//! Anything else is copied through verbatim. An attached error is rendered
//! after the template, followed by one `Caused by:` line per source.

use std::error::Error;
use std::fmt::Write as _;
use std::iter::Peekable;
use std::str::Chars;

use time::OffsetDateTime;
use time::format_description::{self, OwnedFormatItem};

use crate::error::{CaptureError, Result};
use crate::event::LogEvent;

/// Default template. Header line, context line, then the message.
pub const DEFAULT_LAYOUT: &str = "#2.0#%d{yyyy MM dd HH:mm:ss.SSS}#%d{XXX}#%p#%c#%n#%X{space}#%X{operation_id}#%X{activity_id}#%C#%t#%n%m#%n%n";

/// Date pattern used by a bare `%d`.
const DEFAULT_DATE_PATTERN: &str = "yyyy-MM-dd HH:mm:ss,SSS";

/// Java-style date tokens and their `time` format description equivalents.
const DATE_TOKENS: &[(&str, &str)] = &[
    ("yyyy", "[year]"),
    ("MM", "[month]"),
    ("dd", "[day]"),
    ("HH", "[hour]"),
    ("mm", "[minute]"),
    ("ss", "[second]"),
    ("SSS", "[subsecond digits:3]"),
];

const OFFSET_TOKEN: &str = "XXX";
const OFFSET_DESCRIPTION: &str = "[offset_hour sign:mandatory]:[offset_minute]";

/// A compiled `%d{..}` pattern. `XXX` renders `Z` for UTC timestamps, so
/// the UTC variant is compiled separately.
#[derive(Debug, Clone)]
struct DateFormat {
    offset: OwnedFormatItem,
    utc: OwnedFormatItem,
}

impl DateFormat {
    fn render(&self, out: &mut String, ts: OffsetDateTime) {
        let format = if ts.offset().is_utc() { &self.utc } else { &self.offset };
        if let Ok(text) = ts.format(format) {
            out.push_str(&text);
        }
    }
}

#[derive(Debug, Clone)]
enum Segment {
    Literal(String),
    Date(DateFormat),
    Level,
    Logger,
    Origin,
    Thread,
    Message,
    Newline,
    Context(String),
}

/// Identity of the logger a call is formatted for.
#[derive(Debug, Clone, Copy)]
pub struct LogContext<'a> {
    pub logger_name: &'a str,
    pub space: &'a str,
    pub namespace: Option<&'a str>,
    pub operation_id: &'a str,
    pub activity_id: &'a str,
    pub channel: &'a str,
}

impl<'a> LogContext<'a> {
    fn lookup(&self, key: &str) -> Option<&'a str> {
        match key {
            "space" => Some(self.space),
            "namespace" => self.namespace,
            "operation_id" | "correlation_id" => Some(self.operation_id),
            "activity_id" => Some(self.activity_id),
            "channel" => Some(self.channel),
            _ => None,
        }
    }
}

/// A parsed layout template.
#[derive(Debug, Clone)]
pub struct PatternLayout {
    pattern: String,
    segments: Vec<Segment>,
}

impl Default for PatternLayout {
    fn default() -> Self {
        Self::parse(DEFAULT_LAYOUT).unwrap_or_else(|_| Self {
            pattern: "%m%n".to_string(),
            segments: vec![Segment::Message, Segment::Newline],
        })
    }
}

impl PatternLayout {
    /// Parses a template.
    ///
    /// # Errors
    ///
    /// Returns `CaptureError::InvalidLayout` if a converter option is not closed.
    pub fn parse(pattern: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = pattern.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '%' {
                literal.push(c);
                continue;
            }
            let Some(converter) = chars.next() else {
                literal.push('%');
                break;
            };
            let segment = match converter {
                '%' => {
                    literal.push('%');
                    continue;
                }
                'n' => Segment::Newline,
                'm' => Segment::Message,
                'p' => Segment::Level,
                'c' => Segment::Logger,
                'C' => Segment::Origin,
                't' => Segment::Thread,
                'd' => {
                    let date = take_option(&mut chars, pattern)?;
                    Segment::Date(parse_date(
                        pattern,
                        date.as_deref().unwrap_or(DEFAULT_DATE_PATTERN),
                    )?)
                }
                'X' => match take_option(&mut chars, pattern)? {
                    Some(key) => Segment::Context(key),
                    None => {
                        literal.push_str("%X");
                        continue;
                    }
                },
                other => {
                    literal.push('%');
                    literal.push(other);
                    continue;
                }
            };
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(segment);
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            pattern: pattern.to_string(),
            segments,
        })
    }

    /// The template this layout was parsed from.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Formats one call.
    pub fn format(&self, event: &LogEvent<'_>, context: &LogContext<'_>) -> String {
        let mut out = String::with_capacity(self.pattern.len() + event.message.len() + 64);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Date(date) => date.render(&mut out, event.timestamp),
                Segment::Level => out.push_str(event.level.as_str()),
                Segment::Logger => out.push_str(context.logger_name),
                Segment::Origin => out.push_str(event.origin.unwrap_or_default()),
                Segment::Thread => out.push_str(event.thread.unwrap_or_default()),
                Segment::Message => out.push_str(event.message),
                Segment::Newline => out.push('\n'),
                Segment::Context(key) => out.push_str(context.lookup(key).unwrap_or_default()),
            }
        }
        if let Some(error) = event.error {
            append_error_chain(&mut out, error);
        }
        out
    }
}

fn take_option(chars: &mut Peekable<Chars<'_>>, pattern: &str) -> Result<Option<String>> {
    if chars.peek() != Some(&'{') {
        return Ok(None);
    }
    chars.next();
    let mut option = String::new();
    for c in chars.by_ref() {
        if c == '}' {
            return Ok(Some(option));
        }
        option.push(c);
    }
    Err(CaptureError::invalid_layout(
        pattern,
        "unclosed '{' in converter option",
    ))
}

fn parse_date(pattern: &str, date: &str) -> Result<DateFormat> {
    let compile = |description: String| {
        format_description::parse_owned::<1>(&description).map_err(|e| {
            CaptureError::invalid_layout(pattern, format!("date pattern '{date}': {e}"))
        })
    };
    Ok(DateFormat {
        offset: compile(translate_date(date, OFFSET_DESCRIPTION))?,
        utc: compile(translate_date(date, "Z"))?,
    })
}

/// Rewrites a Java-style date pattern into a `time` format description.
fn translate_date(date: &str, offset: &str) -> String {
    let mut description = String::with_capacity(date.len() * 4);
    let mut rest = date;
    'outer: while !rest.is_empty() {
        if let Some(remaining) = rest.strip_prefix(OFFSET_TOKEN) {
            description.push_str(offset);
            rest = remaining;
            continue;
        }
        for (token, component) in DATE_TOKENS {
            if let Some(remaining) = rest.strip_prefix(token) {
                description.push_str(component);
                rest = remaining;
                continue 'outer;
            }
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            if c == '[' {
                description.push_str("[[");
            } else {
                description.push(c);
            }
        }
        rest = chars.as_str();
    }
    description
}

fn append_error_chain(out: &mut String, error: &(dyn Error + 'static)) {
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    let _ = writeln!(out, "{error}");
    let mut source = error.source();
    while let Some(cause) = source {
        let _ = writeln!(out, "Caused by: {cause}");
        source = cause.source();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::LogLevel;
    use std::fmt;
    use time::macros::datetime;

    fn context() -> LogContext<'static> {
        LogContext {
            logger_name: "multiapps.process.op-42.OPERATION.log.a1",
            space: "s1",
            namespace: None,
            operation_id: "op-42",
            activity_id: "a1",
            channel: "OPERATION.log",
        }
    }

    fn event(message: &str) -> LogEvent<'_> {
        LogEvent::new(LogLevel::Info, message).with_timestamp(datetime!(2024-03-05 07:08:09.012 UTC))
    }

    #[derive(Debug)]
    struct Inner;

    impl fmt::Display for Inner {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "connection reset")
        }
    }

    impl Error for Inner {}

    #[derive(Debug)]
    struct Outer(Inner);

    impl fmt::Display for Outer {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "upload failed")
        }
    }

    impl Error for Outer {
        fn source(&self) -> Option<&(dyn Error + 'static)> {
            Some(&self.0)
        }
    }

    #[test]
    fn test_default_layout() {
        let layout = PatternLayout::default();
        assert_eq!(layout.pattern(), DEFAULT_LAYOUT);

        let text = layout.format(&event("step 1 started").with_thread(Some("worker-1")), &context());
        assert_eq!(
            text,
            "#2.0#2024 03 05 07:08:09.012#Z#INFO#multiapps.process.op-42.OPERATION.log.a1#\n\
             #s1#op-42#a1##worker-1#\n\
             step 1 started#\n\n"
        );
    }

    #[test]
    fn test_bare_date_uses_default_pattern() {
        let layout = PatternLayout::parse("%d %p %m").unwrap();
        let text = layout.format(&event("hello"), &context());
        assert_eq!(text, "2024-03-05 07:08:09,012 INFO hello");
    }

    #[test]
    fn test_non_utc_offset() {
        let layout = PatternLayout::parse("%d{HH:mm XXX}").unwrap();
        let ts = datetime!(2024-03-05 07:08:09 -05:30);
        let text = layout.format(&event("x").with_timestamp(ts), &context());
        assert_eq!(text, "07:08 -05:30");
    }

    #[test]
    fn test_date_literals_pass_through() {
        let layout = PatternLayout::parse("%d{[dd/MM] 'at' HH}").unwrap();
        let text = layout.format(&event("x"), &context());
        assert_eq!(text, "[05/03] 'at' 07");
    }

    #[test]
    fn test_date_pattern_translation() {
        assert_eq!(
            translate_date("yyyy-MM-dd HH:mm:ss,SSS XXX", "Z"),
            "[year]-[month]-[day] [hour]:[minute]:[second],[subsecond digits:3] Z"
        );
        assert_eq!(translate_date("[XXX]", OFFSET_DESCRIPTION), "[[[offset_hour sign:mandatory]:[offset_minute]]");
    }

    #[test]
    fn test_context_lookup_and_origin() {
        let layout = PatternLayout::parse("[%X{correlation_id}/%X{channel}/%X{namespace}/%X{unknown}] %C: %m").unwrap();
        let text = layout.format(&event("query done").with_origin(Some("sqlx::query")), &context());
        assert_eq!(text, "[op-42/OPERATION.log//] sqlx::query: query done");
    }

    #[test]
    fn test_literals_and_unknown_converters() {
        let layout = PatternLayout::parse("100%% %q %X %m%").unwrap();
        let text = layout.format(&event("done"), &context());
        assert_eq!(text, "100% %q %X done%");
    }

    #[test]
    fn test_unclosed_option_is_rejected() {
        let err = PatternLayout::parse("%d{yyyy").unwrap_err();
        assert!(matches!(err, CaptureError::InvalidLayout { .. }));
    }

    #[test]
    fn test_error_chain_is_appended() {
        let layout = PatternLayout::parse("%p %m").unwrap();
        let error = Outer(Inner);
        let text = layout.format(&event("deploy failed").with_error(Some(&error)), &context());
        assert_eq!(
            text,
            "INFO deploy failed\nupload failed\nCaused by: connection reset\n"
        );
    }
}
