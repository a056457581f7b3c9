use clap::{Arg, Command};

pub use ringlog::*;

use std::sync::Arc;

mod config;
mod exposition;
mod metrics;
mod samplers;
mod scheduler;

use config::Config;
use metrics::MetricRegistry;
use samplers::SAMPLERS;
use scheduler::Scheduler;

fn main() {
    // parse command line options
    let matches = Command::new(env!("CARGO_BIN_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .long_about(
            "nodepulse gathers kernel-maintained counters and exposes metrics \
            on a Prometheus compatible endpoint.",
        )
        .arg(
            Arg::new("CONFIG")
                .help("Agent configuration file")
                .action(clap::ArgAction::Set)
                .required(false)
                .index(1),
        )
        .get_matches();

    // load config from file, or run on the built-in defaults
    let config: Arc<Config> = match matches.get_one::<String>("CONFIG") {
        Some(file) => match Config::load(file) {
            Ok(c) => c.into(),
            Err(error) => {
                eprintln!("error loading config file: {file}\n{error}");
                std::process::exit(1);
            }
        },
        None => Config::default().into(),
    };

    // configure debug log
    let debug_output: Box<dyn Output> = Box::new(Stderr::new());

    let level = config.log().level();

    let debug_log = if level <= Level::Info {
        LogBuilder::new().format(ringlog::default_format)
    } else {
        LogBuilder::new()
    }
    .output(debug_output)
    .build()
    .expect("failed to initialize debug log");

    let mut log = MultiLogBuilder::new()
        .level_filter(level.to_level_filter())
        .default(debug_log)
        .build()
        .start();

    // initialize async runtime
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(1)
        .thread_name("nodepulse")
        .build()
        .expect("failed to launch async runtime");

    // spawn logging thread
    rt.spawn(async move {
        loop {
            tokio::time::sleep(std::time::Duration::from_millis(100)).await;
            let _ = log.flush();
        }
    });

    // ctrl-c stops the sampling loop; in-flight scrapes complete before the
    // server exits
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(true);
    })
    .expect("failed to set ctrl-c handler");

    // initialize and gather the counter sources
    let mut sources = Vec::new();

    for init in SAMPLERS {
        match init(config.clone()) {
            Ok(Some(s)) => {
                info!("initialized '{}' source", s.name());
                sources.push(s);
            }
            Ok(None) => {}
            Err(e) => {
                warn!("failed to initialize source: {e}");
            }
        }
    }

    let registry = Arc::new(MetricRegistry::new());

    let scheduler = match Scheduler::new(&config, registry.clone(), sources) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("metric registration failed: {e}");
            std::process::exit(1);
        }
    };

    let http = rt.spawn(exposition::http::serve(
        config.clone(),
        registry,
        shutdown_rx.clone(),
    ));

    // drive sampling until shutdown, then let the server drain
    rt.block_on(async move {
        scheduler.run(shutdown_rx).await;

        info!("sampling stopped, waiting for exposition to drain");

        let _ = http.await;
    });
}
