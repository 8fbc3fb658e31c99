use tfm_host::commands::{self, Command};
use tfm_host::config::Config;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load();

    // Initialize structured logging (tracing); RUST_LOG wins over config
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log.level)),
        )
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = Command::parse(&args)?;

    let mut stdout = std::io::stdout();
    if matches!(command, Command::Help | Command::Version) {
        let vfs = tfm_vfs::Vfs::new(tfm_vfs::Registry::new(config.catalog()));
        return commands::run(&vfs, &command, &mut stdout).await;
    }

    let vfs = config.build_vfs().await?;
    let result = commands::run(&vfs, &command, &mut stdout).await;
    vfs.registry().unload_all().await;
    result
}
