//! Schwab MCP - read-only brokerage tools over the Model Context Protocol
//!
//! Serves account, quote, option chain, and price history tools on stdio.
//! All logging goes to stderr; stdout carries only the MCP wire.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use schwab_mcp::{
    auth::TokenStore,
    cli::{Cli, Command},
    client::SchwabClient,
    config::Config,
    server::Server,
    setup_tracing,
    tools::ToolRegistry,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup tracing
    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {e}");
        return ExitCode::FAILURE;
    }

    match cli.command {
        Some(Command::Auth { redirect_url }) => run_auth(&config, &redirect_url).await,
        Some(Command::Serve) | None => run_server(&config).await,
    }
}

fn build_token_store(config: &Config) -> schwab_mcp::Result<TokenStore> {
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.http.timeout_secs))
        .build()
        .map_err(|e| schwab_mcp::Error::Config(format!("Failed to create HTTP client: {e}")))?;

    Ok(TokenStore::new(
        http_client,
        config.endpoints.token_url.clone(),
        config.resolve_client_id(),
        config.resolve_client_secret(),
        config.token_path(),
        Duration::from_secs(config.token.safety_margin_secs),
    ))
}

/// Run the MCP server on stdio
async fn run_server(config: &Config) -> ExitCode {
    let tokens = match build_token_store(config) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("Failed to create token store: {e}");
            return ExitCode::FAILURE;
        }
    };

    let client = match SchwabClient::new(
        Arc::clone(&tokens),
        config.endpoints.trader_base.clone(),
        config.endpoints.market_base.clone(),
        Duration::from_secs(config.http.timeout_secs),
    ) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Failed to create API client: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        token_path = %tokens.token_path().display(),
        "Starting Schwab MCP server"
    );

    let registry = ToolRegistry::new(client, config.default_account.clone());
    let server = Server::new(registry);

    if let Err(e) = server.run().await {
        error!("Server error: {e}");
        return ExitCode::FAILURE;
    }

    info!("Server shutdown complete");
    ExitCode::SUCCESS
}

/// Exchange an authorization redirect URL for the initial token
async fn run_auth(config: &Config, redirect_url: &str) -> ExitCode {
    let code = match extract_code(redirect_url) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let tokens = match build_token_store(config) {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to create token store: {e}");
            return ExitCode::FAILURE;
        }
    };

    match tokens
        .exchange_code(&code, &config.credentials.callback_url)
        .await
    {
        Ok(_) => {
            println!("Token saved to {}", tokens.token_path().display());
            println!("You can now run `schwab-mcp serve`.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Authorization exchange failed: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Pull the `code` query parameter out of the pasted redirect URL
fn extract_code(redirect_url: &str) -> schwab_mcp::Result<String> {
    let url = url::Url::parse(redirect_url).map_err(|e| {
        schwab_mcp::Error::Config(format!("Invalid redirect URL: {e}"))
    })?;

    url.query_pairs()
        .find(|(key, _)| key == "code")
        .map(|(_, value)| value.into_owned())
        .ok_or_else(|| {
            schwab_mcp::Error::Config(
                "Redirect URL has no `code` query parameter. Paste the full URL from the \
                 browser address bar after approving access."
                    .to_string(),
            )
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_code_from_redirect() {
        let code =
            extract_code("https://127.0.0.1/?code=C0.abc%40def&session=xyz").unwrap();
        assert_eq!(code, "C0.abc@def");
    }

    #[test]
    fn redirect_without_code_is_rejected() {
        assert!(extract_code("https://127.0.0.1/?session=xyz").is_err());
        assert!(extract_code("not a url").is_err());
    }
}
