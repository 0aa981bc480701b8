//! Log output plumbing: progress-bar aware writer, compact formatter, and
//! secret filtering so API tokens never land in the log.

use indicatif::MultiProgress;
use std::io;
use std::sync::OnceLock;
use tracing_core::{Event, Subscriber};
use tracing_subscriber::{
    fmt::{
        format::{self, Format, Writer},
        FmtContext, FormatEvent, FormatFields, MakeWriter,
    },
    registry::LookupSpan,
};

/// Writes log lines through the progress bar set so in-flight bars are
/// suspended instead of torn by interleaved output.
#[derive(Clone)]
pub struct IndicatifWriter {
    progress_bars: MultiProgress,
}

impl IndicatifWriter {
    pub fn new(pb: MultiProgress) -> Self {
        Self { progress_bars: pb }
    }
}

impl io::Write for IndicatifWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.progress_bars.suspend(|| io::stderr().write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.progress_bars.suspend(|| io::stderr().flush())
    }
}

impl<'a> MakeWriter<'a> for IndicatifWriter {
    type Writer = IndicatifWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Our own INFO lines print bare; everything else keeps the default format.
pub struct TracingFormatter;

impl<S, N> FormatEvent<S, N> for TracingFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: format::Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let metadata = event.metadata();

        let mut buffer = String::new();
        let mut custom_writer = Writer::new(&mut buffer);

        if *metadata.level() == tracing_core::metadata::Level::INFO
            && metadata.target().starts_with("wheelsmith")
        {
            ctx.format_fields(custom_writer.by_ref(), event)?;
            custom_writer.write_char('\n')?;
        } else {
            let default_format = Format::default();
            default_format.format_event(ctx, custom_writer, event)?;
        }

        filter_secrets(&mut buffer);
        writer.write_str(&buffer)
    }
}

fn token_regex() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    // PyPI API tokens all start with the `pypi-` prefix
    RE.get_or_init(|| regex::Regex::new(r"pypi-[A-Za-z0-9_\-]{8,}").expect("token regex is valid"))
}

fn filter_secrets(buffer: &mut String) {
    *buffer = token_regex().replace_all(buffer, "pypi-<token>").to_string();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pypi_tokens_are_filtered() {
        let mut line = "uploading with pypi-AgEIcHlwaS5vcmcabcdef token".to_string();
        filter_secrets(&mut line);
        assert_eq!(line, "uploading with pypi-<token> token");
    }

    #[test]
    fn ordinary_lines_pass_through() {
        let mut line = "Built wheel for linux/x86_64/gnu".to_string();
        filter_secrets(&mut line);
        assert_eq!(line, "Built wheel for linux/x86_64/gnu");
    }
}
