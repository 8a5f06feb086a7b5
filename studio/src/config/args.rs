//! Command-line arguments for the studio binary

use clap::Parser;

/// Build, relax and run MD on atomic structures with a machine-learned potential
#[derive(Parser, Debug, Default)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "studio.yaml")]
    pub config_file: String,

    /// Override output file: (default stdout)
    #[arg(short, long)]
    pub output: Option<String>,

    /// Relax the structure after building it
    #[arg(long)]
    pub relax: bool,

    /// Run molecular dynamics on the latest structure
    #[arg(long)]
    pub md: bool,

    /// Read commands from stdin instead of running once
    #[arg(short, long)]
    pub interactive: bool,

    /// Override model variant (small/1M or large/5M)
    #[arg(long)]
    pub model: Option<String>,

    /// Override compute device (cpu or cuda)
    #[arg(long)]
    pub device: Option<String>,

    /// Override MD temperature, in the unit of the configuration file
    #[arg(long)]
    pub temperature: Option<f64>,

    /// Override target pressure, in the unit of the configuration file
    #[arg(long)]
    pub pressure: Option<f64>,

    /// Override the supercell repeat used by the viewer
    #[arg(long)]
    pub repeat: Option<usize>,

    /// Override the directory HTML views are written to
    #[arg(long)]
    pub view_dir: Option<String>,
}
