//! structure-studio command-line interface

use color_eyre::eyre::Result;
use studio::StudioApplication;

fn main() -> Result<()> {
    color_eyre::install()?;
    StudioApplication::from_cli()?.run()
}
