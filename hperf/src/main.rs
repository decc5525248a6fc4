use anyhow::Error;
use clap::Parser;
use hperf::{
    bench::Benchmark,
    cfg::BenchmarkConfig,
    cmd::Cmd,
    error::ConfigError,
    perf::{Perf, Report},
};
use tokio::runtime::Builder;

pub fn main() {
    let cmd = Cmd::parse();
    if let Err(err) = hperf::logging::init(cmd.verbose as usize) {
        eprintln!("ERROR: failed to initialize logging: {err}");
        std::process::exit(1);
    }

    let json = cmd.json;
    match run(cmd) {
        Ok(report) if json => match serde_json::to_string_pretty(&report) {
            Ok(v) => println!("{v}"),
            Err(err) => {
                log::error!("failed to serialize report: {err}");
                std::process::exit(1);
            }
        },
        Ok(report) => print!("{report}"),
        // Configuration errors are not considered as failures.
        Err(err) if err.is::<ConfigError>() => {
            log::error!("{err}");
            std::process::exit(0);
        }
        Err(err) => {
            log::error!("{err}");
            std::process::exit(1);
        }
    }
}

fn run(cmd: Cmd) -> Result<Report, Error> {
    let cfg: BenchmarkConfig = cmd.try_into()?;
    let bench = Benchmark::new(&cfg)?;

    log::info!(
        "running {} workers for {:?} against {} {} ...",
        cfg.workers,
        cfg.duration,
        bench.template().method(),
        bench.template().uri(),
    );

    let report = Builder::new_multi_thread()
        .enable_io()
        .enable_time()
        .thread_name("hperf:w")
        .build()?
        .block_on(async {
            let mut perf = Perf::new(cfg.perf_config());
            perf.register(bench)?;
            perf.start()?;

            perf.wait().await
        })?;

    Ok(report)
}
