//! cloudctl - a declarative cloud command-line framework
//!
//! Commands are records in an embedded table. Running one resolves its
//! resource arguments, builds the request message, calls the REST API,
//! follows pages and operations, and renders the result through a projection.

pub mod actions;
pub mod calliope;
pub mod config;
pub mod console;
pub mod display;
pub mod error;
pub mod format;
pub mod gcp;
pub mod iam;
pub mod invocation;
pub mod progress;
pub mod projection;
pub mod resolver;
pub mod resource;
pub mod scenario;

/// Version injected at compile time via CLOUDCTL_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("CLOUDCTL_VERSION") {
    Some(v) => v,
    None => "dev",
};

use calliope::{CommandTree, Namespace, Parsed};
use config::{Properties, Verbosity};
use console::Console;
use error::{CliError, Result, EXIT_OK};
use gcp::auth::{GcpCredentials, TokenSource};
use gcp::client::{ClientSettings, GcpClient};
use gcp::http::Transport;
use invocation::{Interrupt, Invocation};
use resource::cache::{self, ResourceCache};
use resource::poller::PollerConfig;
use resource::Registry;
use scenario::capture::SessionCapturer;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Everything `run` needs from its environment
pub struct RunContext {
    pub properties: Properties,
    pub console: Console,
    pub transport: Arc<dyn Transport>,
    /// Application Default Credentials when `None`
    pub credentials: Option<Arc<dyn TokenSource>>,
    /// Built from `poll_max_wait_secs` when `None`
    pub poller: Option<PollerConfig>,
    /// Resource cache location; the platform cache directory when `None`
    pub cache_dir: Option<PathBuf>,
    pub interrupt: Interrupt,
}

/// A failed invocation and where it failed
struct Failure {
    command_path: String,
    error: CliError,
    debug: bool,
}

/// Run one command line (without the program name) and return the exit code
pub async fn run(ctx: RunContext, argv: &[String]) -> i32 {
    let console = ctx.console.clone();
    let capturer = ctx.properties.capture_session_file.clone().map(|path| {
        let capturer = SessionCapturer::new(path, &shell_words::join(argv));
        console.set_capturer(capturer.clone());
        capturer
    });

    let (code, message) = match execute(ctx, argv).await {
        Ok(()) => (EXIT_OK, None),
        Err(failure) => {
            report(&console, &failure);
            (failure.error.exit_code(), Some(failure.error.to_string()))
        }
    };
    console.flush();

    if let Some(capturer) = capturer {
        if let Err(e) = capturer.finish(code, message.as_deref()) {
            tracing::warn!("Failed to write session capture: {:#}", e);
        }
    }
    code
}

fn report(console: &Console, failure: &Failure) {
    tracing::error!("{} failed: {:?}", failure.command_path, failure.error);
    console.status(&format!(
        "ERROR: ({}) {}",
        failure.command_path, failure.error
    ));
    if let Some(remediation) = failure.error.remediation() {
        console.status(remediation);
    }
    if failure.debug {
        console.status(&format!("{:#?}", failure.error));
    }
}

async fn execute(ctx: RunContext, argv: &[String]) -> std::result::Result<(), Failure> {
    let tree = CommandTree::global();
    let mut command_path = tree.path_hint(argv);
    let mut debug = false;
    let fail = |command_path: &str, debug: bool, error: CliError| Failure {
        command_path: command_path.to_string(),
        error,
        debug,
    };

    let mut properties = ctx.properties;
    let registry = Registry::for_invocation(&properties.api_endpoint_overrides);
    let ns = match calliope::parse(tree, &registry, argv) {
        Ok(Parsed::Command(ns)) => ns,
        Ok(Parsed::Info(text)) => {
            return ctx
                .console
                .write_out(&text)
                .map_err(|e| fail(&command_path, debug, e));
        }
        Err(e) => return Err(fail(&command_path, debug, e)),
    };
    command_path = ns.command_path();

    if let Err(e) = apply_flags(&mut properties, &ns) {
        return Err(fail(&command_path, debug, e));
    }
    debug = properties.verbosity == Verbosity::Debug;

    let invocation = prepare(
        properties,
        registry,
        ctx.console,
        ctx.transport,
        ctx.credentials,
        ctx.poller,
        ctx.cache_dir,
        ctx.interrupt,
        &command_path,
    )
    .await
    .map_err(|e| fail(&command_path, debug, e))?;

    actions::run(&invocation, &ns)
        .await
        .map_err(|e| fail(&command_path, debug, e))
}

/// Layer the framework flags over the loaded properties
fn apply_flags(properties: &mut Properties, ns: &Namespace) -> Result<()> {
    if let Some(project) = ns.value("project") {
        properties.project = Some(project.to_string());
    }
    if let Some(billing) = ns.value("billing_project") {
        properties.billing_project = Some(billing.to_string());
    }
    if ns.flag("quiet") {
        properties.quiet = true;
    }
    if ns.is_specified("verbosity") {
        if let Some(verbosity) = ns.value("verbosity") {
            properties.verbosity = verbosity
                .parse()
                .map_err(|e: String| CliError::usage(format!("argument --verbosity: {e}")))?;
        }
    }
    if ns.flag("log_http") {
        properties.log_http = true;
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn prepare(
    properties: Properties,
    registry: Registry,
    console: Console,
    transport: Arc<dyn Transport>,
    credentials: Option<Arc<dyn TokenSource>>,
    poller: Option<PollerConfig>,
    cache_dir: Option<PathBuf>,
    interrupt: Interrupt,
    command_path: &str,
) -> Result<Invocation> {
    let credentials: Arc<dyn TokenSource> = match credentials {
        Some(credentials) => credentials,
        None => Arc::new(GcpCredentials::new().await?),
    };
    let settings = ClientSettings::from_properties(
        &properties,
        credentials.kind(),
        command_path,
        console.is_interactive(),
    );
    let client = GcpClient::new(transport.clone(), credentials, settings, console.clone());

    let cache: Option<Arc<dyn ResourceCache>> = cache_dir
        .or_else(cache::default_dir)
        .map(|dir| Arc::from(cache::open(properties.cache_implementation, &dir)));
    let poller = poller.unwrap_or_else(|| {
        PollerConfig::default().with_max_wait(Duration::from_secs(properties.poll_max_wait_secs))
    });

    Ok(Invocation::new(
        properties,
        registry,
        console,
        client,
        transport,
        cache,
        interrupt,
        command_path,
        poller,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calliope::command::ReleaseTrack;

    #[test]
    fn test_apply_flags_overrides_properties() {
        let command = serde_json::from_str(
            r#"{"path": "compute zones list", "help": "", "action": {"kind": "list", "collection": "compute.zones"}}"#,
        )
        .unwrap();
        let ns = Namespace::new(ReleaseTrack::Ga, command, calliope::flags::global_flags())
            .with_values("project", &["flag-project"])
            .with_values("quiet", &["true"]);
        let mut properties = Properties {
            project: Some("env-project".into()),
            ..Properties::default()
        };
        apply_flags(&mut properties, &ns).unwrap();
        assert_eq!(properties.project.as_deref(), Some("flag-project"));
        assert!(properties.quiet);
        assert!(!properties.can_prompt());
    }
}
