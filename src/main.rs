use ffmpeg_pipe::pipeline::PipelineDriver;

mod config;

fn init_logging(verbose: bool) {
    env_logger::Builder::from_default_env()
        .filter_level(if verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();
}

#[tokio::main]
async fn main() -> ! {
    let config = config::Config::from_env().unwrap_or_else(|e| {
        eprintln!("Error in configuration: {:#}", e);
        std::process::exit(2);
    });
    init_logging(config.verbose);
    ffmpeg_pipe::init().expect("ffmpeg init");

    log::info!(
        "publishing camera {} ({}x{}@{}, {} bps, profile {}) to {}",
        config.device,
        config.width,
        config.height,
        config.fps,
        config.bitrate,
        config.profile.as_str(),
        config.output
    );

    let driver = PipelineDriver::new(config.pipeline(), config.retry_policy());
    let cancel = driver.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("stop requested, draining");
            cancel.cancel();
        }
    });

    match driver.run().await {
        Ok(report) => {
            log::info!(
                "{} frames captured, {} packets published over {} session(s)",
                report.frames_captured,
                report.packets_written,
                report.sessions
            );
            std::process::exit(0);
        }
        Err(e) => {
            log::error!("pipeline failed: {:#}", e);
            std::process::exit(1);
        }
    }
}
