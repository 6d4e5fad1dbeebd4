use anyhow::Context as _;
use clap::FromArgMatches as _;
use gsm::{
    api::Api,
    auth::Authenticator,
    batch::Cancellation,
    cmd,
    config::{self, OAuthMode},
    retry::Retrier,
    Scopes,
};
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

fn init_tracing(verbose: bool) {
    let default = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };

    let env_filter = EnvFilter::builder()
        .with_default_directive(default.into())
        .with_env_var("GSM_LOG")
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let nouns = gsm::nouns();
    let matches = cmd::command(&nouns).get_matches();
    let globals = cmd::Globals::from_arg_matches(&matches)?;

    init_tracing(globals.verbose);

    let (noun, sub) = cmd::selected(&nouns, &matches)?;

    let (config, path) = config::load(&globals.config, &config::search_path())
        .context("failed to load config")?;

    let scopes = if config.scopes.is_empty() {
        noun.service
            .scopes()
            .iter()
            .map(|s| (*s).to_owned())
            .collect()
    } else {
        config.scopes.clone()
    };

    // A token minted elsewhere takes precedence over the configured credentials
    let auth = if let Ok(token) = std::env::var("GSM_ACCESS_TOKEN") {
        Authenticator::fixed(&token)?
    } else {
        match config.oauth_mode {
            OAuthMode::Delegated => {
                let subject = globals
                    .delegate_to
                    .clone()
                    .or_else(|| config.subject.clone())
                    .with_context(|| {
                        format!("{path} has no subject to delegate to, set one or pass --delegateTo")
                    })?;

                Authenticator::delegated(config.credentials()?, subject)
                    .context("failed to load delegated credentials")?
            }
            OAuthMode::Default => Authenticator::default_credentials()?,
        }
    };

    let client = reqwest::Client::builder()
        .build()
        .context("failed to build client")?;

    let mut api = Api::new(client, auth, scopes);
    if let Some(root) = &config.api_root {
        api = api.with_root(root);
    }

    let cancel = Cancellation::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            tracing::warn!("interrupted, letting in-flight requests finish, interrupt again to exit now");
            cancel.cancel();

            if tokio::signal::ctrl_c().await.is_ok() {
                std::process::exit(130);
            }
        });
    }

    let rt = cmd::Runtime {
        api,
        retrier: Retrier::new(config.retry_policy()),
        cancel,
        threads: config.threads,
        delay: config.batch_delay(),
        format: globals.format(),
    };

    cmd::run(&rt, noun, sub).await?;

    Ok(())
}
