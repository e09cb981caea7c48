use clap::{Parser, Subcommand};
use pplx_common::Category;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "pplx")]
#[command(about = "PPLX batch editor: aux data matching, renaming and change logs", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Project root holding config/ (default: PPLX_BATCH_HOME or the install dir)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Process EXISTING / PROPOSED folders or ZIP archives
    Process {
        /// EXISTING input (folder or .zip); defaults to the last one used
        #[arg(short, long)]
        existing: Option<PathBuf>,

        /// PROPOSED input (folder or .zip); defaults to the last one used
        #[arg(short, long)]
        proposed: Option<PathBuf>,

        /// Workbook with the nodes sheet; defaults to the last one used
        #[arg(short = 'x', long)]
        excel: Option<PathBuf>,

        /// Output folder (default: Downloads/Processed PPLX/<prefix>_O-Calcs_<timestamp>)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Profile to use for this run (becomes the active profile)
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Fill default aux values into copies and write the fill-details workbook
    FillDetails {
        /// Folder of source PPLX files
        #[arg(short, long)]
        source: PathBuf,

        /// Workbook with the nodes sheet
        #[arg(short = 'x', long)]
        excel: PathBuf,

        /// Folder for modified copies (default: <source>/Modified PPLX)
        #[arg(short, long)]
        modified: Option<PathBuf>,

        /// Output workbook (default: <source>/PPLX_Fill_Details.xlsx)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// File info and aux data of every PPLX in a folder, as JSON
    Report {
        #[arg(required = true)]
        dir: PathBuf,

        /// Write the JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show one file's poles, aux data and element counts
    Inspect {
        #[arg(required = true)]
        file: PathBuf,

        /// Export the element tree as JSON to this file
        #[arg(long)]
        structure: Option<PathBuf>,

        /// List spans grouped by type and length
        #[arg(long)]
        spans: bool,
    },

    /// Set one aux field in place on every matching file of a folder
    SetAux {
        #[arg(required = true)]
        dir: PathBuf,

        /// Aux Data number (1-8)
        #[arg(short, long)]
        slot: u8,

        #[arg(long)]
        value: String,

        /// Only files whose name contains this text (`*` for all)
        #[arg(short, long)]
        pattern: Option<String>,
    },

    /// Show the aux values the active profile assigns for a note
    AnalyzeNote {
        #[arg(required = true)]
        text: String,

        #[arg(short, long, default_value = "EXISTING")]
        category: Category,
    },

    /// Manage profiles
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },
}

#[derive(Subcommand)]
pub enum ProfileAction {
    /// List available profiles
    List,
    /// Print the active profile
    Show,
    /// Switch the active profile (interactive when no name is given)
    Use { name: Option<String> },
    /// Set a key of the active profile (value is JSON or plain text)
    Set { key: String, value: String },
}
