use anyhow::{Context, Result, bail};
use clap::Parser;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use modkit_fetch::{
    ClientOptions, Compression, HttpClient, HttpResponse, QueryValues, Request, RequestBody,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing_subscriber::EnvFilter;

/// Environment prefix for client options, e.g. `MODKIT_FETCH__TIMEOUT=2s`
const ENV_PREFIX: &str = "MODKIT_FETCH__";

/// modkit-fetch - send one HTTP request and print the response body
#[derive(Parser)]
#[command(name = "modkit-fetch")]
#[command(about = "modkit-fetch - send one HTTP request and print the response body")]
#[command(version)]
struct Cli {
    /// Target URL
    url: String,

    /// Path to a YAML file with client options
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP method
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,

    /// Request header as `Name: value`; repeatable
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,

    /// Query parameter as `key=value`; repeatable
    #[arg(short, long = "query")]
    query: Vec<String>,

    /// Request body; `@path` reads the body from a file
    #[arg(short, long)]
    data: Option<String>,

    /// Content-Type of the request body
    #[arg(long)]
    content_type: Option<String>,

    /// Basic auth credentials as `user[:password]`
    #[arg(short, long)]
    user: Option<String>,

    /// Compress the body and decode a matching response (gzip, deflate, zlib)
    #[arg(long)]
    compress: Option<String>,

    /// Redirects to follow (overrides config)
    #[arg(long)]
    max_redirects: Option<usize>,

    /// Overall timeout, e.g. `10s` (overrides config)
    #[arg(long, value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Dial timeout, e.g. `500ms` (overrides config)
    #[arg(long, value_parser = humantime::parse_duration)]
    connect_timeout: Option<Duration>,

    /// Proxy URL (overrides config)
    #[arg(long)]
    proxy: Option<String>,

    /// Accept any server certificate
    #[arg(short = 'k', long)]
    insecure: bool,

    /// Print the status line and response headers before the body
    #[arg(short, long)]
    include: bool,

    /// Log the wire request before sending it
    #[arg(long)]
    dump: bool,

    /// Log verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.dump);

    let options = load_options(&cli)?;
    let client = HttpClient::from_options(options).context("failed to build HTTP client")?;
    let request = build_request(&cli).await?;

    let mut response = match client.dispatch(request).await {
        Ok(response) => response,
        Err(err) => {
            let (error, response) = err.into_parts();
            if let Some(response) = response {
                tracing::warn!(status = %response.status(), uri = %response.uri(), "last response before failure");
            }
            return Err(error).context(format!("request to {} failed", cli.url));
        }
    };

    let mut stdout = tokio::io::stdout();
    if cli.include {
        stdout.write_all(head_text(&response).as_bytes()).await?;
    }
    while let Some(chunk) = response.body_mut().chunk().await? {
        stdout.write_all(&chunk).await?;
    }
    stdout.flush().await?;
    Ok(())
}

/// Logs go to stderr so the body on stdout stays clean.
fn init_logging(verbose: u8, dump: bool) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let mut directives = format!("modkit_fetch={level},fetch_cli={level}");
    if dump {
        directives.push_str(",modkit_fetch::dump=info");
    }
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Layered options: defaults -> YAML (if provided) -> env (`MODKIT_FETCH__*`) -> CLI flags.
fn load_options(cli: &Cli) -> Result<ClientOptions> {
    if let Some(path) = &cli.config
        && !path.is_file()
    {
        bail!("config file does not exist: {}", path.display());
    }
    let file_options = layered_options(cli.config.as_deref())?;
    Ok(cli_overrides(cli).merge(file_options))
}

fn layered_options(config: Option<&Path>) -> Result<ClientOptions> {
    let mut figment = Figment::new().merge(Serialized::defaults(ClientOptions::defaults()));
    if let Some(path) = config {
        figment = figment.merge(Yaml::file(path));
    }
    figment
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .context("invalid client configuration")
}

fn cli_overrides(cli: &Cli) -> ClientOptions {
    ClientOptions {
        timeout: cli.timeout,
        connect_timeout: cli.connect_timeout,
        insecure_skip_verify: cli.insecure.then_some(true),
        max_redirects: cli.max_redirects,
        proxy: cli.proxy.clone(),
        ..ClientOptions::default()
    }
}

async fn build_request(cli: &Cli) -> Result<Request> {
    let mut request = Request::new(cli.method.clone(), cli.url.clone());

    for header in &cli.headers {
        let (name, value) = header
            .split_once(':')
            .with_context(|| format!("invalid header '{header}', expected 'Name: value'"))?;
        request.add_header(name.trim(), value.trim());
    }

    if !cli.query.is_empty() {
        let mut values = QueryValues::new();
        for pair in &cli.query {
            let (key, value) = pair
                .split_once('=')
                .with_context(|| format!("invalid query parameter '{pair}', expected 'key=value'"))?;
            values.add(key, value);
        }
        request.query = Some(values.into());
    }

    if let Some(data) = &cli.data {
        request.body = match data.strip_prefix('@') {
            Some(path) => {
                let file = tokio::fs::File::open(path)
                    .await
                    .with_context(|| format!("failed to open body file '{path}'"))?;
                RequestBody::stream(file)
            }
            None => RequestBody::from(data.as_str()),
        };
    }
    if let Some(content_type) = &cli.content_type {
        request.content_type.clone_from(content_type);
    }

    if let Some(user) = &cli.user {
        let (username, password) = user.split_once(':').unwrap_or((user.as_str(), ""));
        request = request.basic_auth(username, password);
    }

    if let Some(token) = &cli.compress {
        let compression = Compression::from_token(token)
            .with_context(|| format!("unsupported compression '{token}'"))?;
        request.compression = Some(compression);
    }

    request.show_debug = cli.dump;
    Ok(request)
}

/// Status line and headers, curl `-i` style.
fn head_text(response: &HttpResponse) -> String {
    let headers: String = response
        .headers()
        .iter()
        .map(|(name, value)| {
            format!(
                "{name}: {}\r\n",
                value.to_str().unwrap_or("<non-ascii value>")
            )
        })
        .collect();
    format!("{}\r\n{headers}\r\n", response.status())
}
