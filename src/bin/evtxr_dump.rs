use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process::exit;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command, error::ErrorKind};
use log::Level;
use simplelog::{ColorChoice, Config, TermLogger, TerminalMode};

use evtxr::{EvtxFilter, EvtxParser, ParseResult, ParserSettings};

/// Fraction of failed records tolerated before the exit code flips to 2.
const DEFAULT_TOLERANCE: f64 = 0.1;

const EXIT_OK: i32 = 0;
const EXIT_USAGE_OR_IO: i32 = 1;
const EXIT_PARSE_FAILURES: i32 = 2;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum OutputFormat {
    Xml,
    Json,
    Summary,
    Table,
}

struct EvtxrDump {
    input: PathBuf,
    threads: usize,
    format: OutputFormat,
    filter: EvtxFilter,
    no_color: bool,
    tolerance: f64,
    templates_dir: Option<PathBuf>,
}

impl EvtxrDump {
    fn from_cli_matches(matches: &ArgMatches) -> Result<Self> {
        let input = PathBuf::from(
            matches
                .get_one::<String>("INPUT")
                .expect("This is a required argument"),
        );

        let format = match matches
            .get_one::<String>("output-format")
            .expect("has default")
            .as_str()
        {
            "json" => OutputFormat::Json,
            "summary" => OutputFormat::Summary,
            "table" => OutputFormat::Table,
            _ => OutputFormat::Xml,
        };

        let threads = *matches.get_one::<usize>("threads").expect("has default");

        let mut filter = EvtxFilter::new();
        if let Some(&id) = matches.get_one::<u64>("record-id") {
            filter = filter.record_id(id);
        }
        if let Some(&n) = matches.get_one::<usize>("first") {
            filter = filter.first(n);
        }
        if let Some(&n) = matches.get_one::<usize>("last") {
            filter = filter.last(n);
        }
        if let Some(provider) = matches.get_one::<String>("filter-provider") {
            filter = filter.provider(provider.clone());
        }
        if let Some(&id) = matches.get_one::<u32>("filter-event-id") {
            filter = filter.event_id(id);
        }
        if let Some(&level) = matches.get_one::<u8>("filter-level") {
            filter = filter.level(level);
        }

        Ok(EvtxrDump {
            input,
            threads,
            format,
            filter,
            no_color: matches.get_flag("no-color"),
            tolerance: *matches.get_one::<f64>("tolerance").expect("has default"),
            templates_dir: matches.get_one::<String>("load-templates").map(PathBuf::from),
        })
    }

    fn run(&self) -> Result<i32> {
        let settings = ParserSettings::new().num_threads(self.threads);
        let parser = EvtxParser::from_path(&self.input)
            .with_context(|| format!("Failed to open {}", self.input.display()))?
            .with_configuration(settings);

        #[cfg(feature = "wevt_templates")]
        if let Some(dir) = &self.templates_dir {
            let count = evtxr::wevt::load_dir(&parser.template_cache(), dir)
                .with_context(|| format!("Failed to load templates from {}", dir.display()))?;
            log::info!("preloaded {count} templates from {}", dir.display());
        }

        #[cfg(not(feature = "wevt_templates"))]
        if self.templates_dir.is_some() {
            anyhow::bail!("this binary was built without the `wevt_templates` feature");
        }

        let result = parser.parse().context("Failed to parse EVTX file")?;

        let stdout = io::stdout();
        let mut out = BufWriter::new(stdout.lock());

        match self.format {
            OutputFormat::Xml => self.print_xml(&mut out, &result)?,
            OutputFormat::Json => self.print_json(&mut out, &result)?,
            OutputFormat::Summary => self.print_summary(&mut out, &result)?,
            OutputFormat::Table => self.print_table(&mut out, &result)?,
        }
        out.flush()?;

        for warning in &result.stats.warnings {
            log::warn!("{warning}");
        }

        let total = result.stats.records_parsed + result.stats.records_failed;
        if total > 0 && (result.stats.records_failed as f64) > self.tolerance * (total as f64) {
            return Ok(EXIT_PARSE_FAILURES);
        }

        Ok(EXIT_OK)
    }

    fn print_xml(&self, out: &mut impl Write, result: &ParseResult) -> Result<()> {
        for record in self.filter.apply(&result.records) {
            writeln!(out, "Record {}", record.record_id)?;
            writeln!(out, "{}", record.xml)?;
        }
        Ok(())
    }

    fn print_json(&self, out: &mut impl Write, result: &ParseResult) -> Result<()> {
        for record in self.filter.apply(&result.records) {
            serde_json::to_writer(&mut *out, record)?;
            writeln!(out)?;
        }
        Ok(())
    }

    fn print_summary(&self, out: &mut impl Write, result: &ParseResult) -> Result<()> {
        writeln!(out, "File version: {}.{}", result.header.major_version, result.header.minor_version)?;
        writeln!(out, "Chunks parsed: {}", result.stats.chunks_parsed)?;
        writeln!(out, "Chunks skipped: {}", result.stats.chunks_skipped)?;
        writeln!(out, "Records parsed: {}", result.stats.records_parsed)?;
        writeln!(out, "Records failed: {}", result.stats.records_failed)?;
        writeln!(out, "Template definitions: {}", result.stats.templates.definitions.len())?;
        writeln!(out, "Template references: {}", result.stats.templates.references)?;
        writeln!(out, "Warnings: {}", result.stats.warnings.len())?;
        Ok(())
    }

    fn print_table(&self, out: &mut impl Write, result: &ParseResult) -> Result<()> {
        writeln!(
            out,
            "{:>10}  {:<24}  {:<40}  {:>8}  {:>5}",
            "Record", "Time", "Provider", "EventID", "Level"
        )?;

        for record in self.filter.apply(&result.records) {
            let level = record
                .level
                .map(|l| l.to_string())
                .unwrap_or_else(|| "-".to_string());
            let level = if self.no_color {
                level
            } else {
                colorize_level(record.level, &level)
            };

            writeln!(
                out,
                "{:>10}  {:<24}  {:<40}  {:>8}  {:>5}",
                record.record_id,
                record.timestamp.to_string(),
                record.provider.as_deref().unwrap_or("-"),
                record
                    .event_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                level,
            )?;
        }
        Ok(())
    }
}

/// Critical/error levels red, warning yellow; everything else unstyled.
fn colorize_level(level: Option<u8>, text: &str) -> String {
    match level {
        Some(1) | Some(2) => format!("\x1b[31m{text}\x1b[0m"),
        Some(3) => format!("\x1b[33m{text}\x1b[0m"),
        _ => text.to_string(),
    }
}

fn cli() -> Command {
    Command::new("evtxr_dump")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Decodes .evtx files")
        .arg(Arg::new("INPUT").required(true).help("The .evtx file to decode"))
        .arg(
            Arg::new("threads")
                .short('t')
                .long("threads")
                .default_value("0")
                .value_parser(clap::value_parser!(usize))
                .help("Worker threads for chunk parsing (0 = all cores, 1 = single-threaded)"),
        )
        .arg(
            Arg::new("output-format")
                .short('o')
                .long("format")
                .value_parser(["xml", "json", "summary", "table"])
                .default_value("xml")
                .help("Output format"),
        )
        .arg(
            Arg::new("record-id")
                .long("record-id")
                .value_parser(clap::value_parser!(u64))
                .help("Only output the record with this id"),
        )
        .arg(
            Arg::new("first")
                .long("first")
                .value_parser(clap::value_parser!(usize))
                .help("Only output the first N matching records"),
        )
        .arg(
            Arg::new("last")
                .long("last")
                .value_parser(clap::value_parser!(usize))
                .help("Only output the last N matching records"),
        )
        .arg(
            Arg::new("filter-provider")
                .long("filter-provider")
                .help("Only output records from this provider"),
        )
        .arg(
            Arg::new("filter-event-id")
                .long("filter-event-id")
                .value_parser(clap::value_parser!(u32))
                .help("Only output records with this event id"),
        )
        .arg(
            Arg::new("filter-level")
                .long("filter-level")
                .value_parser(clap::value_parser!(u8))
                .help("Only output records with this level"),
        )
        .arg(
            Arg::new("no-color")
                .long("no-color")
                .action(ArgAction::SetTrue)
                .help("Disable ANSI colors in table output"),
        )
        .arg(
            Arg::new("tolerance")
                .long("tolerance")
                .default_value("0.1")
                .value_parser(clap::value_parser!(f64))
                .hide_default_value(false)
                .help("Fraction of failed records tolerated before exiting with status 2"),
        )
        .arg(
            Arg::new("load-templates")
                .long("load-templates")
                .value_name("DIR")
                .help("Preload WEVT templates from the PE files in DIR before parsing"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .action(ArgAction::Count)
                .help("Log verbosity (-v warn, -vv info, -vvv debug, -vvvv trace)"),
        )
}

fn init_logging(matches: &ArgMatches) {
    let level = match matches.get_count("verbose") {
        0 => return,
        1 => Level::Warn,
        2 => Level::Info,
        3 => Level::Debug,
        _ => Level::Trace,
    };

    if TermLogger::init(
        level.to_level_filter(),
        Config::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )
    .is_err()
    {
        eprintln!("Failed to initialize logging");
    }
}

fn main() {
    let matches = match cli().try_get_matches() {
        Ok(matches) => matches,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            exit(EXIT_OK);
        }
        Err(e) => {
            let _ = e.print();
            exit(EXIT_USAGE_OR_IO);
        }
    };

    init_logging(&matches);

    let code = match EvtxrDump::from_cli_matches(&matches).and_then(|dump| dump.run()) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:?}");
            EXIT_USAGE_OR_IO
        }
    };

    exit(code);
}
