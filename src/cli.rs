use clap::Parser;

use crate::convert::DEFAULT_OUTPUT_NAME;
use crate::zip::CompressionMethod;

#[derive(Parser, Debug)]
#[command(name = "coverzip")]
#[command(version)]
#[command(about = "Pair WAV tracks with JPG covers in a ZIP archive and repackage them as MP3 entries", long_about = None)]
#[command(after_help = "Examples:\n  \
  coverzip album.zip                      write converted_mp3_with_covers.zip\n  \
  coverzip -l -v album.zip                show every pair without writing anything\n  \
  coverzip -z -o -d out.zip album.zip     overwrite out.zip with compressed entries")]
pub struct Cli {
    /// ZIP file path
    #[arg(value_name = "FILE")]
    pub file: String,

    /// Write the converted archive to this path
    #[arg(short = 'd', long = "output", value_name = "ZIP", default_value = DEFAULT_OUTPUT_NAME)]
    pub output: String,

    /// Only analyze and print the report
    #[arg(short = 'l')]
    pub list: bool,

    /// List every pair and every audio/image entry
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Compress output entries with DEFLATE instead of storing them
    #[arg(short = 'z', long = "deflate")]
    pub deflate: bool,

    /// Never overwrite an existing output file
    #[arg(short = 'n')]
    pub never_overwrite: bool,

    /// Overwrite the output file WITHOUT prompting
    #[arg(short = 'o')]
    pub overwrite: bool,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,
}

impl Cli {
    pub fn is_quiet(&self) -> bool {
        self.quiet > 0
    }

    pub fn is_very_quiet(&self) -> bool {
        self.quiet > 1
    }

    pub fn compression_method(&self) -> CompressionMethod {
        if self.deflate {
            CompressionMethod::Deflate
        } else {
            CompressionMethod::Stored
        }
    }

    /// Default `tracing` filter when `RUST_LOG` is unset
    pub fn log_filter(&self) -> &'static str {
        match (self.quiet, self.verbose) {
            (0, true) => "coverzip=debug",
            (0, false) => "coverzip=info",
            (1, _) => "coverzip=warn",
            _ => "coverzip=error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cli = Cli::try_parse_from(["coverzip", "album.zip"]).unwrap();
        assert_eq!(cli.output, DEFAULT_OUTPUT_NAME);
        assert!(!cli.list && !cli.is_quiet());
        assert_eq!(cli.compression_method(), CompressionMethod::Stored);
        assert_eq!(cli.log_filter(), "coverzip=info");
    }

    #[test]
    fn flags() {
        let cli = Cli::try_parse_from([
            "coverzip",
            "-z",
            "-qq",
            "-d",
            "out.zip",
            "album.zip",
        ])
        .unwrap();
        assert_eq!(cli.file, "album.zip");
        assert!(cli.is_very_quiet());
        assert_eq!(cli.output, "out.zip");
        assert_eq!(cli.compression_method(), CompressionMethod::Deflate);
        assert_eq!(cli.log_filter(), "coverzip=error");
    }

    #[test]
    fn file_is_required() {
        assert!(Cli::try_parse_from(["coverzip"]).is_err());
    }
}
