use anyhow::Result;
use clap::Parser;
use env_logger::{Builder, Env};
use log::error;

use shelfsnap::metrics;

mod cli;
mod util;
mod cmd_backup;
mod cmd_restore;
mod cmd_validate;
mod cmd_list;

fn init_logger() {
    // RUST_LOG wins, otherwise info. Example: RUST_LOG=debug shelfsnap restore ...
    Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}

fn main() {
    init_logger();

    if let Err(e) = run() {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = cli::Cli::parse();
    match cli.cmd {
        cli::Cmd::Backup { library, out, auto_dir, flags, registry } =>
            cmd_backup::exec(library, out, auto_dir, flags, registry)?,

        cli::Cmd::Restore { library, file, json, registry } =>
            cmd_restore::exec(library, file, json, registry)?,

        cli::Cmd::Validate { file, json, registry } =>
            cmd_validate::exec(file, json, registry)?,

        cli::Cmd::List { dir, json } =>
            cmd_list::exec(dir, json)?,
    }

    if cli.metrics {
        println!("{}", serde_json::to_string_pretty(&metrics::report())?);
    }
    Ok(())
}
