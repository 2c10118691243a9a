use vision_server::vision::{self, VisionConfig, telemetry};

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let config = VisionConfig::from_cli()?;
    telemetry::init_tracing(config.verbose)?;
    vision::run(config)
}
