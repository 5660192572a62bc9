use anyhow::Context;
use beacon::app::BeaconApp;
use beacon::config::BeaconConfig;
use beacon::telemetry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing().context("failed to initialise telemetry")?;
    parse_cli_args()?;

    let config = BeaconConfig::load().context("failed to load configuration")?;

    let app = BeaconApp::initialise(config)
        .await
        .context("failed to construct application")?;

    app.run().await.context("application runtime error")
}

fn parse_cli_args() -> anyhow::Result<()> {
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            other => anyhow::bail!("unrecognised argument `{other}`"),
        }
    }
    Ok(())
}

fn print_help() {
    println!(
        "\
Usage: beacon

Environment:
  SERVICE_REGISTRATION_KEY   Shared secret presented by registering services (required)
  ADMIN_API_KEY              Key for the /admin endpoints
  PORT                       Listen port (default 3002)
  LOG_LEVEL                  Tracing filter (default info)

Optional config/local.{{toml,yaml,json}} plus BEACON__-prefixed variables
override the http and health sections.
"
    );
}
