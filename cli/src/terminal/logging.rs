use std::fmt;
use std::io::{self, Write};

use colored::*;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Metadata, Subscriber};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::{self, Writer};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, MakeWriter};
use tracing_subscriber::registry::LookupSpan;

use crate::terminal::spinner;

/// Events on this target are terminal output, printed verbatim to stdout.
pub const PRINT_TARGET: &str = "speakerwatch::print";
const RAW_FIELD: &str = "raw_msg";

pub struct SpeakerwatchFormatter;

impl<S, N> FormatEvent<S, N> for SpeakerwatchFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> format::FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let meta: &Metadata<'_> = event.metadata();

        if meta.target() == PRINT_TARGET {
            let mut raw: RawMessage = RawMessage::default();
            event.record(&mut raw);
            return writeln!(writer, "{}", raw.0);
        }

        let (symbol, color_func): (&str, fn(ColoredString) -> ColoredString) = match *meta.level() {
            Level::TRACE => ("[ ]", |s| s.dimmed()),
            Level::DEBUG => ("[?]", |s| s.blue()),
            Level::INFO => ("[+]", |s| s.green().bold()),
            Level::WARN => ("[*]", |s| s.yellow().bold()),
            Level::ERROR => ("[-]", |s| s.red().bold()),
        };

        write!(writer, "{} ", color_func(symbol.into()))?;

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

#[derive(Default)]
struct RawMessage(String);

impl Visit for RawMessage {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == RAW_FIELD {
            self.0 = value.to_string();
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == RAW_FIELD {
            self.0 = format!("{value:?}");
        }
    }
}

#[derive(Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

/// Terminal output goes to stdout, diagnostics to stderr, both around the spinner.
pub struct TerminalWriter {
    stream: Stream,
}

impl Write for TerminalWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        spinner::suspend(|| match self.stream {
            Stream::Stdout => io::stdout().write_all(buf),
            Stream::Stderr => io::stderr().write_all(buf),
        })?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.stream {
            Stream::Stdout => io::stdout().flush(),
            Stream::Stderr => io::stderr().flush(),
        }
    }
}

pub struct TerminalOutput;

impl<'a> MakeWriter<'a> for TerminalOutput {
    type Writer = TerminalWriter;

    fn make_writer(&'a self) -> Self::Writer {
        TerminalWriter {
            stream: Stream::Stderr,
        }
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        let stream: Stream = if meta.target() == PRINT_TARGET {
            Stream::Stdout
        } else {
            Stream::Stderr
        };
        TerminalWriter { stream }
    }
}

/// `RUST_LOG` wins over `-v`. Terminal output stays enabled either way.
pub fn init_logging(verbosity: u8) -> anyhow::Result<()> {
    let level: &str = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter: EnvFilter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{level},hyper=warn,hyper_util=warn,reqwest=warn")))
        .add_directive(format!("{PRINT_TARGET}=info").parse()?);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(TerminalOutput)
        .event_format(SpeakerwatchFormatter)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install logger: {e}"))
}
