// SPDX-License-Identifier: MIT

use classified_diff::*;
use utils::prelude::Result;

use clap::Parser;

#[derive(Parser, Debug)]
pub struct Options {
    #[clap(flatten)]
    pub diff: tool::ClassifiedDiffArgs,

    #[clap(flatten)]
    pub cli: cli::Options,
}

fn do_main() -> Result<()> {
    env_logger::init();

    let args = Options::parse();
    let mut writer = diff_color::Writer::new(args.diff.options.modes());
    tool::classified_diff(&args.diff, &mut writer)?;

    let mut cli = cli::Cli::new(args.cli);
    writer.write(cli.stream())?;

    Ok(())
}

fn main() {
    if let Err(err) = do_main() {
        eprintln!("{}", err);
        std::process::exit(1);
    }
}
