//! `rollcall` - CLI for the rollcall check-in service
//!
//! This binary runs the web server and provides database, member and
//! configuration management commands.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::io::Write;

use anyhow::Context;
use clap::Parser;

use rollcall::cli::{Cli, Command};
use rollcall::{init_logging, Config, Storage};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let mut config = Config::load_from(cli.config.clone()).context("loading configuration")?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Command::Serve(serve) => {
            serve.apply(&mut config);
            config.validate()?;
            let runtime = tokio::runtime::Runtime::new().context("starting async runtime")?;
            runtime.block_on(rollcall::web::serve(config))?;
        }
        Command::Db(db) => {
            let mut storage = open_storage(&config)?;
            db.run(&mut storage, &config, &mut out)?;
        }
        Command::Status(status) => {
            let storage = open_storage(&config)?;
            status.run(&storage, &mut out)?;
        }
        Command::User(user) => {
            let storage = open_storage(&config)?;
            user.run(&storage, &config, &mut out)?;
        }
        Command::Config(config_cmd) => config_cmd.run(&config, &mut out)?,
    }

    out.flush()?;
    Ok(())
}

fn open_storage(config: &Config) -> anyhow::Result<Storage> {
    let path = config.database_path();
    Storage::open(&path).with_context(|| format!("opening database {}", path.display()))
}
