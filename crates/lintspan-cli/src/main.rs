use anyhow::Result;
use lintspan_config::Config;
use std::{env, path::PathBuf, process};

mod session;
mod table;

use session::{Replay, Session};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: {} <session.toml>", args[0]);
        process::exit(1);
    }
    let session_path = PathBuf::from(&args[1]);

    // Presentation settings come from the config file when there is one
    let config = match Config::load() {
        Ok(Some(config)) => config,
        Ok(None) => {
            log::info!(
                "No config file at {}, using defaults",
                Config::config_path().display()
            );
            Config::default()
        }
        Err(e) => {
            eprintln!("Error: Failed to load config file: {e}");
            process::exit(1);
        }
    };

    let session = Session::load(&session_path)?;
    log::info!(
        "Replaying {} steps over {} documents",
        session.steps.len(),
        session.documents.len()
    );

    for line in Replay::new(config).run(&session)? {
        println!("{line}");
    }

    Ok(())
}
