mod error;

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use sfio_format::{OpenOptions, ScanMethod, Section, Selector, SimBox, SimFile, Value};
use structopt::StructOpt;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    Raw,
    Text,
    Json,
    Table,
}

#[derive(Debug)]
struct ParseViewError(String);

impl std::error::Error for ParseViewError {}

impl std::fmt::Display for ParseViewError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Unknown view: {}", self.0)
    }
}

fn parse_view(src: &str) -> std::result::Result<View, ParseViewError> {
    let view = match src {
        "raw" => View::Raw,
        "text" => View::Text,
        "json" | "record" => View::Json,
        "table" => View::Table,
        _ => return Err(ParseViewError(src.to_string())),
    };

    Ok(view)
}

use structopt::clap::AppSettings::*;

#[derive(Debug, StructOpt)]
enum Commands {
    #[structopt(
        name = "b",
        visible_alias = "box",
        about = "Convert a simulation box and print every representation"
    )]
    Box {
        #[structopt(
            short = "t",
            long = "type",
            help = "Representation of the values: basis, lattice, lmpdata, lmpdump or dcd [default: inferred]"
        )]
        typ: Option<String>,

        #[structopt(
            name = "values",
            required = true,
            allow_hyphen_values = true,
            help = "Box values, separated by spaces or commas"
        )]
        values: Vec<String>,
    },

    #[structopt(
        name = "i",
        visible_alias = "info",
        about = "Summarise the frames and sections of files"
    )]
    Info {
        #[structopt(short, long, help = "File format [default: detected from the file name]")]
        format: Option<String>,

        #[structopt(
            long,
            help = "Read and write an index cache next to slow-to-scan files"
        )]
        cache: bool,

        #[structopt(
            short = "m",
            long,
            default_value = "chunk",
            help = "Scan method, line or chunk"
        )]
        method: ScanMethod,

        #[structopt(
            name = "files",
            parse(from_os_str),
            required = true,
            help = "Simulation files to index"
        )]
        files: Vec<PathBuf>,
    },

    #[structopt(name = "s", visible_alias = "show", about = "Print frames or sections of a file")]
    Show {
        #[structopt(short, long, help = "File format [default: detected from the file name]")]
        format: Option<String>,

        #[structopt(
            short = "n",
            long,
            allow_hyphen_values = true,
            help = "Frames to show: an index, a start:stop:step slice or a list like 1,5,9 [default: all]"
        )]
        frames: Option<String>,

        #[structopt(short, long, help = "Show only the sections with this name")]
        section: Option<String>,

        #[structopt(
            short = "a",
            long = "as",
            parse(try_from_str = parse_view),
            default_value = "text",
            help = "Output view: raw, text, json or table"
        )]
        view: View,

        #[structopt(name = "file", parse(from_os_str), help = "Simulation file")]
        path: PathBuf,
    },
}

#[derive(Debug, StructOpt)]
#[structopt(
    name = "sfio",
    about = "Inspect simulation files and convert simulation box representations.",
    settings = &[SubcommandRequiredElseHelp, DisableHelpSubcommand, VersionlessSubcommands],
)]
struct CliOpts {
    #[structopt(
        short,
        long,
        parse(from_occurrences),
        help = "Show verbose output, repeat for more",
        global = true
    )]
    verbose: u8,

    #[structopt(subcommand)]
    cmd: Commands,
}

fn open(path: &Path, format: Option<&str>, method: ScanMethod, cache: bool) -> Result<SimFile> {
    let mut options = OpenOptions::new();
    options.method(method).index_cache(cache);
    if let Some(format) = format {
        options.format(format);
    }
    options.open(path).map_err(|source| Error::OpenFile {
        path: path.to_path_buf(),
        source,
    })
}

fn convert(values: Vec<String>, typ: Option<String>) -> Result<()> {
    let input = values.join(" ");
    let mut simbox = SimBox::new();
    let typ = simbox
        .set_input_str(&input, typ.as_deref())
        .map_err(|source| Error::BoxInput {
            input: input.clone(),
            source,
        })?;

    println!("# input read as {}", typ);
    println!("{}", simbox);
    Ok(())
}

fn summary(path: &Path, format: Option<&str>, method: ScanMethod, cache: bool) -> Result<String> {
    use humansize::{file_size_opts as options, FileSize};

    let file = open(path, format, method, cache)?;
    let index = file.index();
    let size = index.source_len().file_size(options::BINARY).unwrap_or_else(|e| e);

    let mut counts = BTreeMap::new();
    for entry in index.preamble() {
        *counts.entry(entry.name.as_str()).or_insert(0usize) += 1;
    }
    for frame in index.frames() {
        for entry in &frame.sections {
            *counts.entry(entry.name.as_str()).or_insert(0usize) += 1;
        }
    }

    let mut out = format!(
        "{}\n  format:   {}\n  size:     {}\n  frames:   {}\n",
        path.display(),
        index.format(),
        size,
        index.len()
    );
    if !counts.is_empty() {
        let sections = counts
            .iter()
            .map(|(name, n)| format!("{} ({})", name, n))
            .collect::<Vec<_>>()
            .join(", ");
        out.push_str(&format!("  sections: {}\n", sections));
    }
    Ok(out)
}

fn info(files: Vec<PathBuf>, format: Option<String>, method: ScanMethod, cache: bool) -> Result<()> {
    let summaries = files
        .par_iter()
        .map(|path| summary(path, format.as_deref(), method, cache))
        .collect::<Vec<_>>();

    let mut failed = None;
    for result in summaries {
        match result {
            Ok(text) => println!("{}", text),
            Err(e) if failed.is_some() => tracing::error!("{}", e),
            Err(e) => failed = Some(e),
        }
    }
    match failed {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn print_table(section: &Section<'_>) -> std::result::Result<(), sfio_format::Error> {
    let table = section.table()?;
    for (key, value) in table.meta().iter() {
        match value {
            Value::Record(record) => {
                let json = serde_json::to_string_pretty(record).unwrap_or_else(|_| value.to_string());
                println!("# {} =\n{}", key, textwrap::indent(&json, "#   "));
            }
            _ => println!("# {} = {}", key, value),
        }
    }

    println!("{}", table.column_names().collect::<Vec<_>>().join(" "));
    for row in 0..table.num_rows() {
        let cells = table
            .columns()
            .map(|(_, column)| column.get(row).map(|v| v.to_string()).unwrap_or_default())
            .collect::<Vec<_>>();
        println!("{}", cells.join(" "));
    }
    Ok(())
}

fn print_section(path: &Path, section: &Section<'_>, view: View) -> Result<()> {
    let read_error = |source| Error::ReadSection {
        path: path.to_path_buf(),
        name: section.name().to_string(),
        source,
    };

    if view != View::Raw {
        match section.frame_index() {
            Some(i) => println!("# frame {}: {} {}", i, section.name(), section.range()),
            None => println!("# {} {}", section.name(), section.range()),
        }
    }

    match view {
        View::Raw => {
            let raw = section.raw().map_err(read_error)?;
            std::io::stdout()
                .write_all(raw)
                .map_err(|source| Error::Stdout { source })?;
        }
        View::Text => print!("{}", section.text().map_err(read_error)?),
        View::Json => {
            let record = section.record().map_err(read_error)?;
            let json = serde_json::to_string_pretty(record).map_err(|source| Error::Json { source })?;
            println!("{}", json);
        }
        View::Table => print_table(section).map_err(read_error)?,
    }
    Ok(())
}

fn show(
    path: PathBuf,
    format: Option<String>,
    frames: Option<String>,
    section: Option<String>,
    view: View,
) -> Result<()> {
    let file = open(&path, format.as_deref(), ScanMethod::default(), false)?;
    let find_error = |name: &str, source| Error::FindSection {
        path: path.clone(),
        name: name.to_string(),
        source,
    };

    let sections = match (frames, section) {
        (None, Some(name)) => file.section(&name).map_err(|e| find_error(&name, e))?.into_vec(),
        (None, None) => file.frames().collect(),
        (Some(selection), name) => {
            let select_error = |source| Error::SelectFrames {
                path: path.clone(),
                selection: selection.clone(),
                source,
            };
            let selector = selection.parse::<Selector>().map_err(select_error)?;
            let selected = file.select(&selector).map_err(select_error)?;
            match name {
                None => selected,
                Some(name) => {
                    let mut found = Vec::new();
                    for frame in &selected {
                        found.extend(frame.section(&name).map_err(|e| find_error(&name, e))?.into_vec());
                    }
                    found
                }
            }
        }
    };

    tracing::debug!(sections = sections.len(), "showing sections");
    for section in &sections {
        print_section(&path, section, view)?;
    }
    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let opts = CliOpts::from_iter(wild::args());
    init_logging(opts.verbose);

    let result = match opts.cmd {
        Commands::Box { typ, values } => convert(values, typ),
        Commands::Info {
            format,
            cache,
            method,
            files,
        } => info(files, format, method, cache),
        Commands::Show {
            format,
            frames,
            section,
            view,
            path,
        } => show(path, format, frames, section, view),
    };

    if let Err(e) = result {
        eprintln!("{:?}", anyhow::Error::new(e));
        std::process::exit(1);
    }
}
