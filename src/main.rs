use glean::{cli, output, router};
use tracing_subscriber::EnvFilter;

fn main() {
    // Logs go to stderr so stdout stays machine-readable.
    let filter = EnvFilter::try_from_env("GLEAN_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let cli = cli::parse();
    let json = cli.json;
    let code = match router::dispatch(cli) {
        Ok(code) => code,
        Err(err) => output::format_error(&err, json),
    };
    std::process::exit(code);
}
