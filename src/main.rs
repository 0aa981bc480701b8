//! This is the main entry point for the `wheelsmith` binary.

use std::str::FromStr;

use clap::Parser;
use indicatif::MultiProgress;
use miette::IntoDiagnostic;
use tracing_subscriber::{filter::Directive, fmt, prelude::*, EnvFilter};

use wheelsmith::{
    build::Builders,
    console_utils::{IndicatifWriter, TracingFormatter},
    github, matrix,
    opt::{App, BuildOpts, GithubReleaseOpts, PublishOpts, ReleaseOpts, SubCommands},
    publish,
    system_tools::Tool,
    target::Target,
    version::ReleaseTag,
};

// targets are processed strictly sequentially; a single-threaded runtime is
// all the subprocess streaming needs
#[tokio::main(flavor = "current_thread")]
async fn main() -> miette::Result<()> {
    let args = App::parse();

    let multi_progress = MultiProgress::new();

    tracing_subscriber::registry()
        .with(get_default_env_filter(args.verbose.filter()))
        .with(
            fmt::layer()
                .with_writer(IndicatifWriter::new(multi_progress.clone()))
                .event_format(TracingFormatter),
        )
        .init();

    match args.subcommand {
        SubCommands::Build(args) => run_build_from_args(args).await,
        SubCommands::Release(args) => run_release_from_args(args).await,
        SubCommands::Publish(args) => run_publish_from_args(args).await,
        SubCommands::GithubRelease(args) => run_github_release_from_args(args).await,
    }
}

async fn run_build_from_args(args: BuildOpts) -> miette::Result<()> {
    let config = args.common.into_configuration(args.sdist);
    let targets = Target::default_matrix(args.arch);

    let builders = Builders::discover(&config.system_tools, config.sdist).into_diagnostic()?;
    let set = matrix::run(&targets, &config, &builders.wheels, &builders.binaries)
        .await
        .into_diagnostic()?;

    tracing::info!(
        "Build finished with {} of {} targets producing binaries",
        set.binaries_built(),
        targets.len()
    );
    Ok(())
}

async fn run_release_from_args(args: ReleaseOpts) -> miette::Result<()> {
    // tag validation is the very first step so a bad tag has no side effects
    let tag = ReleaseTag::from_str(&args.tag).into_diagnostic()?;
    let config = args.common.into_configuration(args.sdist);

    if !args.skip_github {
        // fail before an hour of building, not after
        config.system_tools.find_tool(Tool::Gh).into_diagnostic()?;
    }

    if args.skip_build {
        tracing::info!("Skipping build stage, releasing existing artifacts");
    } else {
        let targets = Target::default_matrix(args.arch);
        let builders = Builders::discover(&config.system_tools, config.sdist).into_diagnostic()?;
        matrix::run(&targets, &config, &builders.wheels, &builders.binaries)
            .await
            .into_diagnostic()?;
    }

    if args.skip_pypi {
        tracing::info!("Skipping PyPI publish");
    } else {
        publish::publish_pypi(&config).await.into_diagnostic()?;
    }

    if args.skip_github {
        tracing::info!("Skipping GitHub release");
    } else {
        let assets_dir = args.assets.unwrap_or_else(|| config.artifacts_dir.clone());
        github::create_release(&tag, &assets_dir, &config)
            .await
            .into_diagnostic()?;
    }

    tracing::info!("Release {tag} complete");
    Ok(())
}

async fn run_publish_from_args(args: PublishOpts) -> miette::Result<()> {
    let config = args.common.into_configuration(args.sdist);
    publish::publish_pypi(&config).await.into_diagnostic()
}

async fn run_github_release_from_args(args: GithubReleaseOpts) -> miette::Result<()> {
    let tag = ReleaseTag::from_str(&args.tag).into_diagnostic()?;
    let config = args.common.into_configuration(false);
    let assets_dir = args.assets.unwrap_or_else(|| config.artifacts_dir.clone());
    github::create_release(&tag, &assets_dir, &config)
        .await
        .into_diagnostic()
}

/// Constructs a default [`EnvFilter`] that is used when the user did not specify a custom RUST_LOG.
fn get_default_env_filter(verbose: clap_verbosity_flag::VerbosityFilter) -> EnvFilter {
    let mut result = EnvFilter::new(format!("wheelsmith={}", level_for(verbose)));

    if matches!(verbose, clap_verbosity_flag::VerbosityFilter::Trace) {
        result = result.add_directive(Directive::from_str("tokio=info").expect("static directive"));
    }

    result
}

fn level_for(verbose: clap_verbosity_flag::VerbosityFilter) -> &'static str {
    use clap_verbosity_flag::VerbosityFilter;
    match verbose {
        VerbosityFilter::Off => "off",
        VerbosityFilter::Error => "error",
        VerbosityFilter::Warn => "warn",
        VerbosityFilter::Info => "info",
        VerbosityFilter::Debug => "debug",
        VerbosityFilter::Trace => "trace",
    }
}
