use anyhow::{Context, Result};
use kash::config::{Config, Options};
use kash::engine::Calculator;
use kash::{repl, LineRunner, Session, Shell};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> Result<()> {
    let config = Config::from_env(argh::from_env::<Options>());

    let filter = EnvFilter::try_new(&config.log_filter)
        .with_context(|| format!("invalid log filter {:?}", config.log_filter))?;
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let shell = Shell::default();
    let mut session = Session::new(Arc::new(Calculator));
    config.apply(&mut session);

    if let Some(line) = &config.command {
        let result = shell.run_line(line, &mut session, true)?;
        result.display();
        std::process::exit(result.return_code);
    }

    repl::run(&shell, &mut session)
}
