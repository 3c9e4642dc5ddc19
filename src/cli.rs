use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(name = "manualrag", version, about = "Hybrid retrieval over technical manuals")]
pub struct Cli {
    /// Directory holding the index artifacts (default: XDG data dir)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Build the index for a manual, or load it if already built
    Build {
        /// Path to the PDF document
        document: PathBuf,
    },
    /// Search the indexed manual
    Search {
        /// Query text
        query: String,

        /// Number of results to return (default: the configured top_k)
        #[arg(short = 'n', long)]
        count: Option<usize>,

        /// Which retrieval path to use
        #[arg(long, value_enum, default_value_t = SearchMode::Hybrid)]
        mode: SearchMode,

        /// Minimum similarity for semantic matches (overrides config)
        #[arg(long)]
        threshold: Option<f32>,

        /// Emit results as JSON instead of human-readable text
        #[arg(long)]
        json: bool,
    },
    /// List image descriptors recorded for a page
    Images {
        /// 1-based page number
        page: u32,

        /// Emit descriptors as JSON
        #[arg(long)]
        json: bool,
    },
    /// Extract one image's raw bytes from the source document
    Extract {
        /// Path to the PDF document
        document: PathBuf,

        /// 1-based page number the image appears on
        page: u32,

        /// PDF object number of the image
        xref: u32,

        /// Output file (default: <data-dir>/images/page_<page>_img_<xref>.bin)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show whether an index is present and its shape
    Status {
        /// Emit status as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SearchMode {
    Hybrid,
    Semantic,
    Keyword,
}
