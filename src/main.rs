//! Source Tree Statistics Tool
//!
//! Walks a directory tree, classifies files by extension, and aggregates
//! non-blank line, word, and character counts per extension and in total,
//! printing an aligned report sorted by descending line count.
//!
//! Recognized extensions by default: .py .js .ts .tsx .css .html .mjs .jsx

use clap::{ArgAction, Parser, ValueEnum};
use std::collections::{HashMap, HashSet};
use std::env;
use std::ffi::OsString;
use std::fmt::Write as FmtWrite;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use colored::*;
use glob::Pattern;

// Fixed width for the extension column; the numeric columns use the
// literal widths in `format_report_row`.
const EXT_WIDTH: usize = 12;
const RULE_WIDTH: usize = 56;

const READ_FAIL_TAG: &str = "__codestats_read_fail__.py";
const READ_DIR_FAIL_TAG: &str = "__codestats_read_dir_fail__";
const FAULT_ENV_VAR: &str = "CODESTATS_ENABLE_FAULTS";

/// Extensions counted when no `--ext` additions are given.
const DEFAULT_EXTENSIONS: [&str; 8] = [
    ".py", ".js", ".ts", ".tsx", ".css", ".html", ".mjs", ".jsx",
];

/// Directory names pruned at any depth when no `--ignore` additions are given.
const DEFAULT_EXCLUDED_DIRS: [&str; 8] = [
    "node_modules",
    ".git",
    ".next",
    ".clerk",
    "dist",
    "build",
    ".idea",
    ".vscode",
];

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Per-extension line/word/character statistics for source trees",
    long_about = "Recursively scans a directory tree, skipping excluded directory names at \
                  any depth, and reports non-blank line, word, and character counts per \
                  recognized extension plus a grand total."
)]
struct Args {
    /// Root directory to scan
    #[arg(default_value = ".")]
    path: String,

    /// Additional directory names to exclude at any depth
    #[arg(short, long, action = ArgAction::Append)]
    ignore: Vec<String>,

    /// Additional extensions to recognize (leading dot optional)
    #[arg(short = 'x', long = "ext", action = ArgAction::Append)]
    ext: Vec<String>,

    /// How undecodable byte sequences are handled
    #[arg(long, value_enum, default_value = "substitute")]
    decode: DecodePolicy,

    /// Only count files whose name or relative path matches this glob
    #[arg(short = 'f', long)]
    filespec: Option<String>,

    /// Print per-file statistics as files are processed
    #[arg(short, long)]
    verbose: bool,
}

/// Policy for bytes that are not valid UTF-8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum DecodePolicy {
    /// Treat malformed UTF-8 as a per-file read failure
    Strict,
    /// Replace malformed sequences with U+FFFD
    Substitute,
    /// Drop malformed sequences entirely
    Skip,
}

impl DecodePolicy {
    fn decode(self, bytes: Vec<u8>) -> io::Result<String> {
        match self {
            DecodePolicy::Strict => String::from_utf8(bytes)
                .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.utf8_error())),
            DecodePolicy::Substitute => Ok(String::from_utf8_lossy(&bytes).into_owned()),
            DecodePolicy::Skip => {
                let mut text = String::with_capacity(bytes.len());
                for chunk in bytes.utf8_chunks() {
                    text.push_str(chunk.valid());
                }
                Ok(text)
            }
        }
    }
}

/// One file's (or one accumulator's) measurement: non-blank lines,
/// whitespace-delimited words, decoded characters including newlines.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Metrics {
    lines: u64,
    words: u64,
    chars: u64,
}

impl Metrics {
    fn add(&mut self, other: Metrics) {
        self.lines += other.lines;
        self.words += other.words;
        self.chars += other.chars;
    }
}

/// Per-extension accumulator table plus the global totals, updated in
/// lockstep so the per-extension triples always sum to `totals`.
#[derive(Debug, Default)]
struct ScanStats {
    by_extension: HashMap<String, Metrics>,
    totals: Metrics,
}

impl ScanStats {
    fn record(&mut self, ext: &str, metrics: Metrics) {
        self.by_extension
            .entry(ext.to_string())
            .or_default()
            .add(metrics);
        self.totals.add(metrics);
    }
}

/// Resolved scan configuration: the fixed defaults plus any CLI additions.
struct ScanConfig {
    extensions: HashSet<String>,
    excluded_dirs: HashSet<String>,
    decode: DecodePolicy,
    filespec: Option<Pattern>,
    verbose: bool,
}

impl ScanConfig {
    fn from_args(args: &Args) -> io::Result<ScanConfig> {
        let mut extensions: HashSet<String> = DEFAULT_EXTENSIONS
            .iter()
            .map(|ext| ext.to_string())
            .collect();
        extensions.extend(args.ext.iter().map(|ext| normalize_extension(ext)));

        let mut excluded_dirs: HashSet<String> = DEFAULT_EXCLUDED_DIRS
            .iter()
            .map(|dir| dir.to_string())
            .collect();
        excluded_dirs.extend(args.ignore.iter().cloned());

        let filespec = match args.filespec.as_deref() {
            Some(spec) => Some(Pattern::new(spec).map_err(|err| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("Invalid filespec pattern '{}': {}", spec, err),
                )
            })?),
            None => None,
        };

        Ok(ScanConfig {
            extensions,
            excluded_dirs,
            decode: args.decode,
            filespec,
            verbose: args.verbose,
        })
    }
}

fn normalize_extension(ext: &str) -> String {
    if ext.starts_with('.') {
        ext.to_string()
    } else {
        format!(".{}", ext)
    }
}

/// Extracts the extension key (last `.` onward, dot included) from a file
/// name. Names whose stem is empty or all dots (e.g. `.gitignore`) have no
/// key, so dotfiles are never classified by their whole name.
fn extension_key(file_name: &str) -> Option<&str> {
    match file_name.rsplit_once('.') {
        Some((stem, _)) if stem.chars().any(|c| c != '.') => Some(&file_name[stem.len()..]),
        _ => None,
    }
}

/// Whether the walker descends into a directory with this name. A name-only
/// check, so an excluded name is pruned at every depth.
fn should_descend(dir_name: &str, config: &ScanConfig) -> bool {
    !config.excluded_dirs.contains(dir_name)
}

fn measure(content: &str) -> Metrics {
    Metrics {
        lines: content.lines().filter(|line| !line.trim().is_empty()).count() as u64,
        words: content.split_whitespace().count() as u64,
        chars: content.chars().count() as u64,
    }
}

fn failure_injection_enabled() -> bool {
    cfg!(test) || env::var_os(FAULT_ENV_VAR).is_some()
}

fn should_simulate_path_failure(path: &Path, needle: &str) -> bool {
    failure_injection_enabled()
        && path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name == needle)
            .unwrap_or(false)
}

fn read_file_bytes(path: &Path) -> io::Result<Vec<u8>> {
    if should_simulate_path_failure(path, READ_FAIL_TAG) {
        return Err(io::Error::other("simulated file read failure"));
    }
    fs::read(path)
}

fn read_dir_entries(path: &Path) -> io::Result<fs::ReadDir> {
    if should_simulate_path_failure(path, READ_DIR_FAIL_TAG) {
        return Err(io::Error::other("simulated read_dir failure"));
    }
    fs::read_dir(path)
}

fn should_process_file(filespec: Option<&Pattern>, root_path: &Path, file_path: &Path) -> bool {
    filespec
        .map(|pattern| filespec_matches(pattern, root_path, file_path))
        .unwrap_or(true)
}

fn filespec_matches(pattern: &Pattern, root_path: &Path, file_path: &Path) -> bool {
    if file_path
        .file_name()
        .and_then(|name| name.to_str())
        .map(|name| pattern.matches(name))
        .unwrap_or(false)
    {
        return true;
    }

    let relative = match file_path.strip_prefix(root_path) {
        Ok(rel) => rel,
        Err(_) => return false,
    };

    let rel_str = match relative.to_str() {
        Some(s) => s.replace('\\', "/"),
        None => return false,
    };

    pattern.matches(&rel_str)
}

/// Classifies one file, reads it under the configured decode policy, and
/// folds its triple into the accumulators. Unrecognized extensions are
/// skipped silently; read failures are diagnostics, never fatal.
fn process_file(
    file_path: &Path,
    root_path: &Path,
    config: &ScanConfig,
    stats: &mut ScanStats,
    error_count: &mut usize,
) {
    let Some(file_name) = file_path.file_name().and_then(|name| name.to_str()) else {
        return;
    };
    let Some(ext) = extension_key(file_name) else {
        return;
    };
    if !config.extensions.contains(ext) {
        return;
    }
    if !should_process_file(config.filespec.as_ref(), root_path, file_path) {
        return;
    }

    let content = match read_file_bytes(file_path).and_then(|bytes| config.decode.decode(bytes)) {
        Ok(content) => content,
        Err(err) => {
            eprintln!("Error reading {}: {}", file_path.display(), err);
            *error_count += 1;
            return;
        }
    };

    let metrics = measure(&content);
    stats.record(ext, metrics);

    if config.verbose {
        println!("File: {}", file_path.display());
        println!("  Lines: {}", metrics.lines);
        println!("  Words: {}", metrics.words);
        println!("  Characters: {}", metrics.chars);
        println!();
    }
}

fn scan_tree_impl(
    path: &Path,
    root_path: &Path,
    config: &ScanConfig,
    stats: &mut ScanStats,
    error_count: &mut usize,
) -> io::Result<()> {
    let read_dir = match read_dir_entries(path) {
        Ok(iter) => iter,
        Err(err) => {
            eprintln!("Error reading {}: {}", path.display(), err);
            *error_count += 1;
            return Ok(());
        }
    };

    for entry_result in read_dir {
        let entry = match entry_result {
            Ok(entry) => entry,
            Err(err) => {
                eprintln!("Error reading entry in {}: {}", path.display(), err);
                *error_count += 1;
                continue;
            }
        };

        let entry_path = entry.path();
        let file_type = match entry.file_type() {
            Ok(ft) => ft,
            Err(err) => {
                eprintln!("Error reading type for {}: {}", entry_path.display(), err);
                *error_count += 1;
                continue;
            }
        };

        // Symlinked directories can introduce cycles; links are never followed.
        if file_type.is_symlink() {
            continue;
        }

        if file_type.is_dir() {
            let dir_name = entry.file_name();
            if should_descend(&dir_name.to_string_lossy(), config) {
                scan_tree_impl(&entry_path, root_path, config, stats, error_count)?;
            }
        } else if file_type.is_file() {
            process_file(&entry_path, root_path, config, stats, error_count);
        }
    }

    Ok(())
}

/// Walks the tree rooted at `root`, folding every recognized file into
/// `stats`. The root must be a readable directory; anything below it fails
/// soft with a diagnostic and an `error_count` bump.
fn scan_tree(
    root: &Path,
    config: &ScanConfig,
    stats: &mut ScanStats,
    error_count: &mut usize,
) -> io::Result<()> {
    let metadata = fs::metadata(root).map_err(|err| {
        io::Error::new(err.kind(), format!("Cannot scan {}: {}", root.display(), err))
    })?;
    if !metadata.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Not a directory: {}", root.display()),
        ));
    }
    scan_tree_impl(root, root, config, stats, error_count)
}

fn format_report_row(ext: &str, metrics: &Metrics) -> String {
    format!(
        "{:<width$} | {:<10} | {:<12} | {:<15}",
        ext,
        metrics.lines,
        metrics.words,
        metrics.chars,
        width = EXT_WIDTH
    )
}

/// Renders the accumulated counts: header row, per-extension rows sorted by
/// descending line count (ties broken by extension name), and a TOTAL row.
fn build_report(stats: &ScanStats) -> String {
    let mut output = String::new();
    let _ = writeln!(
        output,
        "{:<width$} | {:<10} | {:<12} | {:<15}",
        "Extension",
        "Lines",
        "Words",
        "Characters",
        width = EXT_WIDTH
    );
    let _ = writeln!(output, "{}", "-".repeat(RULE_WIDTH));

    let mut rows: Vec<_> = stats.by_extension.iter().collect();
    rows.sort_by(|(ext_a, a), (ext_b, b)| b.lines.cmp(&a.lines).then_with(|| ext_a.cmp(ext_b)));
    for (ext, metrics) in rows {
        let _ = writeln!(output, "{}", format_report_row(ext, metrics));
    }

    let _ = writeln!(output, "{}", "-".repeat(RULE_WIDTH));
    let _ = writeln!(output, "{}", format_report_row("TOTAL", &stats.totals));
    output
}

fn main() -> io::Result<()> {
    run_with_args(env::args_os())
}

fn run_with_args<I, T>(args: I) -> io::Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args = Args::parse_from(args);
    let config = ScanConfig::from_args(&args)?;

    let root = PathBuf::from(&args.path);
    if !root.exists() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("Path does not exist: {}", root.display()),
        ));
    }
    let display_root = fs::canonicalize(&root).unwrap_or_else(|_| root.clone());

    println!(
        "{} {}",
        "Counting code stats in:".bright_cyan().bold(),
        display_root.display()
    );
    println!();

    let mut stats = ScanStats::default();
    let mut error_count = 0usize;
    scan_tree(&root, &config, &mut stats, &mut error_count)?;

    print!("{}", build_report(&stats));

    if error_count > 0 {
        eprintln!(
            "{} {} file(s) skipped due to read errors",
            "Warning:".red().bold(),
            error_count
        );
    }

    Ok(())
}
