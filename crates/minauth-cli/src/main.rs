use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use minauth_core::{
    AuthorityId, DEFAULT_MASTER_CONFIG, Decision, JsonLinesSink, MasterConfig, authorize,
};
use minauth_salt::{Credentials, SaltApiClient};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod report;

/// Decide whether a minion is a registered CMDB server and fire
/// `AcceptMinion` or `RejectMinion` accordingly.
#[derive(Parser, Debug)]
#[command(name = "minauth", version, about)]
struct Cli {
    /// Id the minion presented (short or fully-qualified hostname).
    minion_id: String,

    /// Salt master configuration file.
    #[arg(long, env = "MINAUTH_MASTER_CONFIG", default_value = DEFAULT_MASTER_CONFIG)]
    master_config: PathBuf,

    /// Master id to target instead of the configured one (truncated at `_`).
    #[arg(long, env = "MINAUTH_AUTHORITY")]
    authority: Option<String>,

    /// salt-api base URL; defaults to the local `rest_cherrypy` port.
    #[arg(long, env = "SALTAPI_URL")]
    api_url: Option<String>,

    /// salt-api eauth user; needs `--password`.
    #[arg(long, env = "SALTAPI_USER", requires = "password")]
    username: Option<String>,

    #[arg(long, env = "SALTAPI_PASS", hide_env_values = true, requires = "username")]
    password: Option<String>,

    #[arg(long, env = "SALTAPI_EAUTH", default_value = "pam")]
    eauth: String,

    /// Per-request timeout for salt-api calls.
    #[arg(long, env = "MINAUTH_TIMEOUT_SECS")]
    timeout_secs: Option<u64>,

    /// Where to publish the outcome event. With `stdout` the report goes to stderr.
    #[arg(long, value_enum, default_value_t = SinkKind::Hook)]
    sink: SinkKind,

    #[arg(long, help = "Print the decision as JSON")]
    json: bool,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence.
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum SinkKind {
    /// salt-api webhook, republished on the master event bus.
    Hook,
    /// One JSON line per event on stdout.
    Stdout,
}

impl Cli {
    /// Stdout carries JSON-lines events when that sink is active.
    fn report_to_stderr(&self) -> bool {
        self.sink == SinkKind::Stdout
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let code = if err.use_stderr() {
                report::EXIT_SETUP_FAILED
            } else {
                report::EXIT_ACCEPTED
            };
            let _ = err.print();
            return ExitCode::from(code);
        }
    };
    init_tracing(&cli.log_level);
    info!("minauth v{}", env!("CARGO_PKG_VERSION"));

    match run(&cli).await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            error!(error = %format!("{err:#}"), "authorization check did not run");
            eprintln!("minauth: {err:#}");
            ExitCode::from(report::EXIT_SETUP_FAILED)
        }
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: &Cli) -> anyhow::Result<u8> {
    let (authority, api_url) = resolve_target(cli)?;
    info!(authority = %authority, api_url = %api_url, "resolved salt master");

    let mut client = SaltApiClient::new(api_url);
    if let Some(secs) = cli.timeout_secs {
        client = client
            .with_timeout(Duration::from_secs(secs))
            .context("building HTTP client")?;
    }
    if let (Some(username), Some(password)) = (&cli.username, &cli.password) {
        client = client.with_credentials(Credentials {
            username: username.clone(),
            password: password.clone(),
            eauth: cli.eauth.clone(),
        });
    }

    let decision: Decision = match cli.sink {
        SinkKind::Hook => authorize(&cli.minion_id, &authority, &client, &client).await,
        SinkKind::Stdout => {
            let sink = JsonLinesSink::new(std::io::stdout());
            authorize(&cli.minion_id, &authority, &client, &sink).await
        }
    };

    if cli.report_to_stderr() {
        report::write(&mut std::io::stderr(), &cli.minion_id, &decision, cli.json)?;
    } else {
        report::write(&mut std::io::stdout(), &cli.minion_id, &decision, cli.json)?;
    }
    Ok(report::exit_code(&decision))
}

/// Master to target and salt-api URL, from flags first and the master
/// config second. The config file is only read when a flag is missing.
fn resolve_target(cli: &Cli) -> anyhow::Result<(AuthorityId, String)> {
    let config = match (&cli.authority, &cli.api_url) {
        (Some(_), Some(_)) => None,
        _ => Some(MasterConfig::load(&cli.master_config).with_context(|| {
            format!("loading master config {}", cli.master_config.display())
        })?),
    };

    let authority = match &cli.authority {
        Some(id) => AuthorityId::from_master_id(id)?,
        None => config
            .as_ref()
            .context("no master config loaded")?
            .authority()?,
    };

    let api_url = match &cli.api_url {
        Some(url) => url.clone(),
        None => config.as_ref().and_then(MasterConfig::api_url).context(
            "no salt-api URL: pass --api-url or set rest_cherrypy.port in the master config",
        )?,
    };

    Ok((authority, api_url))
}
