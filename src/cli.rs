use clap::Parser;

use crate::options::OpenOptions;

#[derive(Parser, Debug)]
#[command(name = "seekzip")]
#[command(version)]
#[command(about = "List and extract ZIP archives from local files or HTTP URLs", long_about = None)]
#[command(after_help = "Examples:\n  \
  seekzip data1.zip -x joe        extract all files except joe from data1.zip\n  \
  seekzip -p foo.zip | more       send contents of foo.zip via pipe into more\n  \
  seekzip -l https://example.com/archive.zip   list files from remote ZIP\n\n\
  Set RUST_LOG (e.g. RUST_LOG=seekzip=debug) for diagnostic output.")]
pub struct Cli {
    /// ZIP file path or HTTP URL
    #[arg(value_name = "FILE")]
    pub file: String,

    /// Files to extract (default: all)
    #[arg(value_name = "FILES")]
    pub files: Vec<String>,

    /// List files (short format)
    #[arg(short = 'l')]
    pub list: bool,

    /// List verbosely, and log at info level
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Extract files to pipe, no messages
    #[arg(short = 'p')]
    pub pipe: bool,

    /// Extract files into exdir
    #[arg(short = 'd', value_name = "DIR")]
    pub extract_dir: Option<String>,

    /// Exclude files that follow
    #[arg(short = 'x', value_name = "FILE", num_args = 1..)]
    pub exclude: Vec<String>,

    /// Never overwrite existing files
    #[arg(short = 'n')]
    pub never_overwrite: bool,

    /// Overwrite files WITHOUT prompting
    #[arg(short = 'o')]
    pub overwrite: bool,

    /// Junk paths (do not make directories)
    #[arg(short = 'j')]
    pub junk_paths: bool,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,

    /// Keep backslashes in entry names instead of treating them as separators
    #[arg(long = "strict-names")]
    pub strict_names: bool,

    /// Do not check entry sizes against the central directory
    #[arg(long = "no-size-check")]
    pub no_size_check: bool,

    /// Do not decode or validate entry names (list mode only)
    #[arg(long = "raw-names")]
    pub raw_names: bool,
}

impl Cli {
    pub fn is_http_url(&self) -> bool {
        self.file.starts_with("http://") || self.file.starts_with("https://")
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet > 0 || self.pipe
    }

    pub fn is_very_quiet(&self) -> bool {
        self.quiet > 1
    }

    /// Default log filter when `RUST_LOG` is unset.
    pub fn log_level(&self) -> &'static str {
        if self.verbose { "info" } else { "warn" }
    }

    /// Archive options for this invocation: lazy, kept open until the
    /// command is done.
    pub fn open_options(&self) -> OpenOptions {
        OpenOptions::default()
            .lazy_entries(true)
            .auto_close(false)
            .strict_file_names(self.strict_names)
            .validate_entry_sizes(!self.no_size_check)
            .decode_strings(!self.raw_names)
    }
}
