use std::fs::OpenOptions;
use std::net::SocketAddr;
use std::num::{NonZeroU16, NonZeroUsize};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use axum::Router;
use clap::{Parser, ValueHint};
use env_logger::Target;
use log::LevelFilter;
use rusty_trigger::config::{
    GatewayConfig, OutputCapture, RejectPolicy, ResponseMode, SubstitutionConfig, WindowMode,
    DEFAULT_PARAM_PATTERN,
};
use rusty_trigger::error::ConfigError;
use rusty_trigger::routes::{RouteTable, RowPolicy};
use rusty_trigger::service;
use tokio::signal;
use tower_http::trace::TraceLayer;

#[tokio::main]
async fn main() -> ExitCode {
    let start = Instant::now();
    let args = CliArgs::parse();

    if let Err(e) = init_logging(&args.log) {
        eprintln!("failed to open log file {:?}: {e}", args.log);
        return ExitCode::FAILURE;
    }

    let (routes, config) = match resolve(&args) {
        Ok(resolved) => resolved,
        Err(e) => {
            log::error!(error:display = e; "invalid configuration");
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let listener = match tokio::net::TcpListener::bind((args.host.as_str(), args.port.get())).await
    {
        Ok(listener) => listener,
        Err(e) => {
            log::error!(host = args.host.as_str(), port = args.port.get(), error:display = e; "failed to bind");
            return ExitCode::FAILURE;
        }
    };

    log::info!(
        version = env!("CARGO_PKG_VERSION"),
        time_taken:debug = start.elapsed(),
        addr:display = args.host,
        port = args.port.get(),
        routes = routes.len(),
        allowed_ips:debug = config.allowed_addresses,
        allowlist = config.allowlist_enabled,
        log_sink = args.log.as_str();
        "Startup finished"
    );

    let router = app(routes, config);
    let served = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await;

    match served {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!(error:display = e; "server stopped");
            ExitCode::FAILURE
        }
    }
}

/// The gateway with request tracing on top.
fn app(routes: RouteTable, config: GatewayConfig) -> Router {
    service::router(routes, config).layer(TraceLayer::new_for_http())
}

/// Logs to stdout, or appends to the file at `sink`.
fn init_logging(sink: &str) -> std::io::Result<()> {
    let mut builder = env_logger::builder();
    builder
        .filter_level(LevelFilter::Info)
        .filter(Some("tower_http"), LevelFilter::Debug)
        .filter(Some("rusty_trigger"), LevelFilter::Debug)
        .filter(Some("rusty_trigger_server"), LevelFilter::Debug)
        .parse_default_env();

    if sink != "stdout" {
        let file = OpenOptions::new().create(true).append(true).open(sink)?;
        builder.target(Target::Pipe(Box::new(file)));
    } else {
        builder.target(Target::Stdout);
    }
    builder.init();
    Ok(())
}

/// Turns the command line into the route table and pipeline configuration.
fn resolve(args: &CliArgs) -> Result<(RouteTable, GatewayConfig), ConfigError> {
    let routes = match (args.cmd.as_deref().filter(|c| !c.is_empty()), &args.routes) {
        (Some(cmd), _) => RouteTable::single(cmd),
        (None, Some(path)) => {
            let policy = if args.strict_routes {
                RowPolicy::Strict
            } else {
                RowPolicy::Skip
            };
            RouteTable::from_csv_file(path, policy)?
        }
        (None, None) => return Err(ConfigError::MissingCommandSource),
    };

    let substitution = SubstitutionConfig::new(
        args.replace_param,
        &args.replace_regex,
        if args.no_stop {
            RejectPolicy::Skip
        } else {
            RejectPolicy::Abort
        },
    )?;

    let config = GatewayConfig {
        rate_limit: args.max_rate_limit,
        window: if args.shared_window {
            WindowMode::Shared
        } else {
            WindowMode::PerPath
        },
        substitution,
        response: if args.return_result {
            ResponseMode::Verbose
        } else {
            ResponseMode::Quiet
        },
        output: if args.combine_output {
            OutputCapture::Combined
        } else {
            OutputCapture::Separate
        },
        pipe_body: args.pipe_body,
        accept_post: !args.no_post,
        timeout: (args.timeout > 0).then(|| Duration::from_secs(args.timeout)),
        max_concurrent: NonZeroUsize::new(args.max_concurrent),
        shell: args.bash_path.clone(),
        ..GatewayConfig::default()
    }
    .with_allowed_list(&args.allowed_ips);

    Ok((routes, config))
}

#[derive(Parser)]
#[command(version, about)]
struct CliArgs {
    /// The host address for the rusty-trigger server.
    #[arg(
        long,
        value_name = "URI",
        value_hint = ValueHint::Hostname,
        default_value = "127.0.0.1",
        env = "RUSTY_TRIGGER_HOST",
    )]
    host: String,
    /// The host port for the rusty-trigger server.
    #[arg(
        short,
        long,
        value_name = "PORT",
        value_hint = ValueHint::Other,
        default_value = "4870",
        env = "RUSTY_TRIGGER_PORT",
    )]
    port: NonZeroU16,
    /// Addresses allowed to run commands, comma separated. Empty disables the check.
    #[arg(
        long,
        value_name = "IPS",
        default_value = "127.0.0.1",
        env = "RUSTY_TRIGGER_ALLOWED_IPS"
    )]
    allowed_ips: String,
    /// CSV file of `path,command` rows.
    #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath, env = "RUSTY_TRIGGER_ROUTES")]
    routes: Option<PathBuf>,
    /// Static command served under `/do`. Takes precedence over `--routes`.
    #[arg(long, value_name = "COMMAND", env = "RUSTY_TRIGGER_CMD")]
    cmd: Option<String>,
    /// Refuse to start if a route row lacks its path or command.
    #[arg(long)]
    strict_routes: bool,
    /// `stdout` or a file to append the log to.
    #[arg(
        long,
        value_name = "SINK",
        value_hint = ValueHint::FilePath,
        default_value = "stdout",
        env = "RUSTY_TRIGGER_LOG"
    )]
    log: String,
    /// Answer with the command output instead of `OK`/`ERR`.
    #[arg(long)]
    return_result: bool,
    /// Requests allowed per path and minute, 0 for no limit.
    #[arg(long, value_name = "N", default_value_t = 10)]
    max_rate_limit: u32,
    /// Use one window deadline for all paths.
    #[arg(long)]
    shared_window: bool,
    /// Replace `$name` tokens in commands with query parameters (and `$body` with the POST body).
    #[arg(long)]
    replace_param: bool,
    /// Pattern every replaced value has to match completely.
    #[arg(long, value_name = "REGEX", default_value = DEFAULT_PARAM_PATTERN)]
    replace_regex: String,
    /// Skip invalid parameters instead of failing the request.
    #[arg(long)]
    no_stop: bool,
    /// Stream POST bodies to the command's stdin.
    #[arg(long)]
    pipe_body: bool,
    /// Capture stderr together with stdout.
    #[arg(long)]
    combine_output: bool,
    /// Seconds after which a command is killed, 0 for no limit.
    #[arg(long, value_name = "SECS", default_value_t = 0)]
    timeout: u64,
    /// Commands allowed to run at the same time, 0 for no limit.
    #[arg(long, value_name = "N", default_value_t = 0)]
    max_concurrent: usize,
    /// Only accept GET requests.
    #[arg(long)]
    no_post: bool,
    /// The shell commands are run with.
    #[arg(
        long,
        value_name = "PATH",
        value_hint = ValueHint::ExecutablePath,
        default_value = "bash",
        env = "RUSTY_TRIGGER_BASH"
    )]
    bash_path: PathBuf,
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT (ctrl+c) handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => log::info!("received SIGINT (ctrl+c), shutting down"),
        () = terminate => log::info!("received SIGTERM, shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(std::iter::once("rusty-trigger-server").chain(args.iter().copied()))
            .unwrap()
    }

    #[tokio::test]
    async fn traced_app_serves_requests() {
        use axum::body::Body;
        use axum::extract::ConnectInfo;
        use axum::http::{Request, StatusCode};
        use tower::ServiceExt;

        let args = parse(&["--cmd", "true"]);
        let (routes, config) = resolve(&args).unwrap();
        let app = app(routes, config);

        let response = app
            .clone()
            .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let mut request = Request::get("/do").body(Body::empty()).unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))));
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        CliArgs::command().debug_assert();
    }

    #[test]
    fn static_command_wins_over_route_file() {
        let args = parse(&["--cmd", "echo 'hi'", "--routes", "/nonexistent.csv"]);
        let (routes, config) = resolve(&args).unwrap();
        assert_eq!(routes.get("/do"), Some("echo 'hi'"));
        assert_eq!(config.allowed_addresses, ["127.0.0.1"]);
        assert_eq!(config.rate_limit, 10);
        assert_eq!(config.response, ResponseMode::Quiet);
        assert!(!config.substitution.enabled);
        assert_eq!(config.timeout, None);
    }

    #[test]
    fn command_source_is_required() {
        let args = parse(&[]);
        assert!(matches!(resolve(&args), Err(ConfigError::MissingCommandSource)));
        let args = parse(&["--cmd", ""]);
        assert!(matches!(resolve(&args), Err(ConfigError::MissingCommandSource)));
    }

    #[test]
    fn invalid_regex_is_fatal() {
        let args = parse(&["--cmd", "true", "--replace-regex", "[a-"]);
        assert!(matches!(resolve(&args), Err(ConfigError::InvalidRegex { .. })));
    }

    #[test]
    fn flags_map_onto_the_config() {
        let args = parse(&[
            "--cmd",
            "true",
            "--allowed-ips",
            "",
            "--return-result",
            "--max-rate-limit",
            "0",
            "--shared-window",
            "--replace-param",
            "--no-stop",
            "--pipe-body",
            "--combine-output",
            "--timeout",
            "5",
            "--max-concurrent",
            "4",
            "--no-post",
            "--bash-path",
            "/bin/sh",
        ]);
        let (_, config) = resolve(&args).unwrap();
        assert!(!config.allowlist_enabled);
        assert_eq!(config.response, ResponseMode::Verbose);
        assert_eq!(config.rate_limit, 0);
        assert_eq!(config.window, WindowMode::Shared);
        assert!(config.substitution.enabled);
        assert_eq!(config.substitution.on_reject, RejectPolicy::Skip);
        assert!(config.pipe_body);
        assert_eq!(config.output, OutputCapture::Combined);
        assert_eq!(config.timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.max_concurrent, NonZeroUsize::new(4));
        assert!(!config.accept_post);
        assert_eq!(config.shell, PathBuf::from("/bin/sh"));
    }
}
