use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::{Parser, ValueEnum};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use maven_resolver_demo::maven::coordinates::Scope;
use maven_resolver_demo::resolve::mediator::{MediationPolicy, TieBreak};
use maven_resolver_demo::resolve::orchestrator::{ResolutionRequest, Resolver, ResolverConfig, DEFAULT_POOL_SIZE, DEFAULT_REMOTE_REPO};

#[derive(Parser, Debug)]
#[command(name = "maven-resolver-demo", version, about = "Resolves Maven dependencies")]
struct Cli {
    /// URI of the remote repository from where dependencies are fetched
    #[arg(short = 'r', long, env = "MAVEN_REMOTE_REPO", default_value = DEFAULT_REMOTE_REPO)]
    remote_repo: String,

    /// Directory where fetched artifacts are cached [default: ~/.m2/resolver-cache]
    #[arg(short = 'l', long, env = "MAVEN_LOCAL_REPO")]
    local_repo: Option<PathBuf>,

    /// Scope of the requested dependencies (compile, runtime, test, provided)
    #[arg(short = 's', long, default_value = "compile")]
    scope: String,

    /// How to pick one version when several are present
    #[arg(short = 'p', long, value_enum, default_value_t = PolicyArg::Nearest)]
    policy: PolicyArg,

    /// How to break ties between equally near versions
    #[arg(long, value_enum, default_value_t = TieBreakArg::FirstDiscovered)]
    tie_break: TieBreakArg,

    /// Maximum number of concurrent downloads
    #[arg(short = 'j', long, default_value_t = DEFAULT_POOL_SIZE)]
    jobs: usize,

    /// Also resolve optional dependencies of transitive dependencies
    #[arg(long)]
    include_optional: bool,

    /// Timeout for a single download attempt, in seconds
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Coordinates of the dependencies to resolve, as group:name[:extension[:classifier]]:version
    #[arg(required = true)]
    dependencies: Vec<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PolicyArg {
    Nearest,
    Highest,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum TieBreakArg {
    FirstDiscovered,
    HighestVersion,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let local_repo = match cli.local_repo {
        Some(path) => path,
        None => {
            let home = std::env::var_os("HOME")
                .ok_or_else(|| anyhow!("HOME is not set, please specify --local-repo"))?;
            PathBuf::from(home).join(".m2").join("resolver-cache")
        }
    };
    let scope: Scope = cli.scope.parse()?;

    let mut config = ResolverConfig::new(local_repo);
    config.remote_repo = cli.remote_repo;
    config.mediation_policy = match cli.policy {
        PolicyArg::Nearest => MediationPolicy::NearestWins,
        PolicyArg::Highest => MediationPolicy::HighestVersion,
    };
    config.tie_break = match cli.tie_break {
        TieBreakArg::FirstDiscovered => TieBreak::FirstDiscovered,
        TieBreakArg::HighestVersion => TieBreak::HighestVersion,
    };
    config.pool_size = cli.jobs;
    config.include_optional = cli.include_optional;
    config.request_timeout = Duration::from_secs(cli.timeout);

    let resolver = Resolver::new(&config)
        .with_context(|| format!("invalid remote repository {}", config.remote_repo))?;
    let request = ResolutionRequest::parse(&cli.dependencies, scope)?;

    let resolution = resolver.start(request);
    let cancel = resolution.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let outcome = resolution.run().await?;
    for warning in &outcome.warnings {
        warn!("{}", warning);
    }
    for artifact in &outcome.artifacts {
        println!("{}", artifact);
    }
    Ok(())
}
