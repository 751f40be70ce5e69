//! Main entry point for the seekzip CLI application.
//!
//! Lists and extracts ZIP archives from the local filesystem or from HTTP
//! URLs, fetching only the byte ranges each operation needs.

use anyhow::{Context, Result, bail};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use tracing::info;
use tracing_subscriber::EnvFilter;

use seekzip::zip::validate_file_name;
use seekzip::{Cli, Entry, HttpRangeReader, ZipExtractor, ZipFile};

/// Opens the archive named on the command line, over HTTP ranges when the
/// input is a URL, and hands it to [`process_zip`].
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level())),
        )
        .with_writer(std::io::stderr)
        .init();

    if cli.raw_names && !(cli.list || cli.verbose) {
        bail!("--raw-names can only be used when listing (-l or -v)");
    }

    if cli.is_http_url() {
        // remote archive, fetched by byte range
        let reader = HttpRangeReader::new(cli.file.clone())
            .await
            .with_context(|| format!("cannot reach {}", cli.file))?;
        let transferred = reader.transfer_counter();
        let size = reader.size();
        let zip = ZipFile::from_reader(reader, size, cli.open_options())
            .await
            .with_context(|| format!("cannot open {}", cli.file))?;

        process_zip(&zip, &cli).await?;
        zip.close();

        if !cli.is_quiet() {
            eprintln!(
                "\nTotal bytes transferred: {}",
                format_size(transferred.load(Ordering::Relaxed))
            );
        }
    } else {
        let zip = ZipFile::open(&cli.file, cli.open_options())
            .await
            .with_context(|| format!("cannot open {}", cli.file))?;
        process_zip(&zip, &cli).await?;
        zip.close();
    }

    Ok(())
}

/// Lists the archive (`-l`, `-v`) or extracts the selected entries.
async fn process_zip(zip: &ZipFile, cli: &Cli) -> Result<()> {
    let extractor = ZipExtractor::new(zip);
    info!(entries = zip.entry_count(), size = zip.file_size(), "archive opened");

    if cli.list || cli.verbose {
        return list_files(zip, &extractor, cli.verbose).await;
    }

    let entries = extractor.list_files().await?;

    // Directories are created on demand; positional names select entries,
    // -x patterns exclude them
    let files_to_extract: Vec<_> = entries
        .iter()
        .filter(|e| {
            if e.is_directory() {
                return false;
            }
            let name = e.file_name.to_string();

            if !cli.files.is_empty() {
                let matches = cli.files.iter().any(|f| {
                    if has_glob_chars(f) {
                        glob_match(f, &name)
                    } else {
                        let basename = Path::new(&name)
                            .file_name()
                            .map(|s| s.to_string_lossy())
                            .unwrap_or_default();
                        name == *f || basename == *f
                    }
                });
                if !matches {
                    return false;
                }
            }

            !cli.exclude.iter().any(|x| name.contains(x.as_str()) || glob_match(x, &name))
        })
        .collect();

    let multiple_files = cli.pipe && files_to_extract.len() > 1;
    for entry in files_to_extract {
        extract_file(&extractor, entry, cli, multiple_files).await?;
    }

    Ok(())
}

/// Prints entry names, or an unzip-style table with sizes, ratio and
/// modification time when `-v` is given.
async fn list_files(zip: &ZipFile, extractor: &ZipExtractor<'_>, verbose: bool) -> Result<()> {
    let entries = extractor.list_files().await?;

    if verbose {
        if !zip.comment().is_empty() {
            println!("{}", zip.comment());
        }
        println!(
            "{:>10}  {:>10}  {:>5}  {:>10}  {:>5}  Name",
            "Length", "Size", "Cmpr", "Date", "Time"
        );
        println!("{}", "-".repeat(70));
    }

    let mut total_uncompressed = 0u64;
    let mut total_compressed = 0u64;
    let mut file_count = 0usize;

    for entry in &entries {
        if !verbose {
            println!("{}", entry.file_name);
            continue;
        }

        let (year, month, day) = entry.mod_date();
        let (hour, minute, _second) = entry.mod_time();

        // percentage saved
        let ratio = if entry.uncompressed_size > 0 && entry.compressed_size <= entry.uncompressed_size {
            format!(
                "{:>4}%",
                100 - (entry.compressed_size * 100 / entry.uncompressed_size)
            )
        } else {
            "  0%".to_string()
        };

        let marker = if entry.is_encrypted() { "*" } else { "" };
        println!(
            "{:>10}  {:>10}  {}  {:04}-{:02}-{:02}  {:02}:{:02}  {}{}",
            entry.uncompressed_size,
            entry.compressed_size,
            ratio,
            year,
            month,
            day,
            hour,
            minute,
            entry.file_name,
            marker
        );

        if !entry.is_directory() {
            total_uncompressed += entry.uncompressed_size;
            total_compressed += entry.compressed_size;
            file_count += 1;
        }
    }

    if verbose {
        println!("{}", "-".repeat(70));
        let total_ratio = if total_uncompressed > 0 && total_compressed <= total_uncompressed {
            format!(
                "{:>4}%",
                100 - (total_compressed * 100 / total_uncompressed)
            )
        } else {
            "  0%".to_string()
        };
        println!(
            "{:>10}  {:>10}  {}  {:>21}  {} files",
            total_uncompressed, total_compressed, total_ratio, "", file_count
        );
    }

    Ok(())
}

/// Writes one entry to stdout (`-p`) or below the output directory,
/// honouring `-j`, `-n` and `-o`.
async fn extract_file(
    extractor: &ZipExtractor<'_>,
    entry: &Entry,
    cli: &Cli,
    show_filename: bool,
) -> Result<()> {
    let name = entry.file_name.to_string();

    if entry.is_encrypted() {
        if !cli.is_very_quiet() {
            eprintln!("Skipping: {} (encrypted)", name);
        }
        return Ok(());
    }

    if cli.pipe {
        if show_filename {
            use tokio::io::AsyncWriteExt;
            let mut stdout = tokio::io::stdout();
            stdout
                .write_all(format!("--- {} ---\n", name).as_bytes())
                .await?;
        }
        extractor
            .extract_to_stdout(entry)
            .await
            .with_context(|| format!("failed to extract {}", name))?;
        return Ok(());
    }

    validate_file_name(&name)?;
    let file_name = if cli.junk_paths {
        Path::new(&name)
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| name.clone())
    } else {
        name.clone()
    };
    let output_path = match cli.extract_dir {
        Some(ref dir) => PathBuf::from(dir).join(&file_name),
        None => PathBuf::from(&file_name),
    };

    if output_path.exists() {
        if cli.never_overwrite {
            if !cli.is_quiet() {
                eprintln!("Skipping: {} (file exists)", name);
            }
            return Ok(());
        }

        if !cli.overwrite {
            if !cli.is_quiet() {
                eprintln!("Skipping: {} (use -o to overwrite)", name);
            }
            return Ok(());
        }
    }

    if !cli.is_quiet() {
        println!("  extracting: {}", name);
    }

    extractor
        .extract_to_file(entry, &output_path)
        .await
        .with_context(|| format!("failed to extract {}", name))?;

    Ok(())
}

fn has_glob_chars(pattern: &str) -> bool {
    pattern.contains('*') || pattern.contains('?')
}

/// `*` and `?` wildcard match over whole names.
///
/// Greedy with a single backtrack point: on a mismatch the most recent `*`
/// absorbs one more character, so the match is linear in pattern times name.
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0, 0);
    // (pattern index after the star, text index it was tried at)
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                star = Some((p + 1, t));
                p += 1;
            }
            Some(&c) if c == '?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match star {
                Some((after, tried)) => {
                    star = Some((after, tried + 1));
                    p = after;
                    t = tried + 1;
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == '*')
}

/// Format a byte size into a human-readable string.
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
