use std::path::Path;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use gitlab_release::cache::DiskCache;
use gitlab_release::config::{self, Preferences};
use gitlab_release::gitlab::client::GitLabClient;
use gitlab_release::gitlab::pipeline::PipelineTrigger;
use gitlab_release::release::orchestrator::{self, GitLabGateway, PipelineOutcome};
use gitlab_release::release::version::{self, Bump};

#[derive(Parser)]
#[command(name = "gitlab-release")]
#[command(version, about = "Tag the next version of a GitLab project and run its pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the next version tag, optionally kicking off a pipeline
    Release {
        /// Project to tag; defaults to the most recently touched project
        #[arg(long)]
        project: Option<u64>,
        /// Which version component to increment
        #[arg(long, value_enum, default_value_t = Bump::Patch)]
        bump: Bump,
        /// Trigger a pipeline for the new tag
        #[arg(long)]
        pipeline: bool,
    },
    /// List starred projects
    Projects {
        #[arg(long)]
        search: Option<String>,
    },
    /// List a project's tags, newest version first
    Tags { project: u64 },
    /// Show the authenticated user
    Whoami,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _guard = init_logging()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(cli))
}

fn init_logging() -> anyhow::Result<tracing_appender::non_blocking::WorkerGuard> {
    let log_path = config::log_path();
    let dir = log_path.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(dir)?;

    let file_name = log_path
        .file_name()
        .unwrap_or_else(|| "gitlab-release.log".as_ref());
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(
        dir, file_name,
    ));
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(writer)
        .with_ansi(false)
        .init();
    Ok(guard)
}

fn pipeline_trigger(prefs: &Preferences) -> Option<PipelineTrigger> {
    match (&prefs.cookie, &prefs.csrf_token) {
        (Some(cookie), Some(csrf_token)) => Some(PipelineTrigger::new(
            prefs.instance(),
            cookie,
            csrf_token,
            prefs.pipeline_variables.clone(),
        )),
        _ => None,
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let prefs = Preferences::load()?;
    let client = GitLabClient::new(prefs.instance(), prefs.token()?)
        .with_cache(DiskCache::new(config::cache_dir()));

    match cli.command {
        Command::Release {
            project,
            bump,
            pipeline,
        } => {
            let project = match project {
                Some(id) => client.get_project(id).await?,
                None => client
                    .latest_project()
                    .await?
                    .ok_or_else(|| anyhow::anyhow!("no recent project found; pass --project"))?,
            };

            let (tags, commits) = tokio::join!(
                client.list_tags(project.id),
                client.list_commits(project.id, "master"),
            );
            let mut names: Vec<String> = tags?.into_iter().map(|t| t.name).collect();
            version::sort_desc(&mut names);

            println!("project: {} ({})", project.name_with_namespace, project.id);
            if let Some(commit) = commits?.first() {
                println!("commit:  {} {}", commit.short_id, commit.title);
            }
            if let Some(current) = names.first() {
                println!("current: {current}");
            }

            let trigger = pipeline_trigger(&prefs);
            let gateway = GitLabGateway {
                client: &client,
                trigger: trigger.as_ref(),
            };
            let outcome = orchestrator::release(&gateway, &project, &names, bump, pipeline).await?;

            println!("created: {}", outcome.tag);
            match outcome.pipeline {
                PipelineOutcome::NotRequested => {}
                PipelineOutcome::Triggered { url: Some(url) } => println!("pipeline: {url}"),
                PipelineOutcome::Triggered { url: None } => println!("pipeline triggered"),
                PipelineOutcome::Failed { message } => {
                    eprintln!("pipeline trigger failed: {message}")
                }
            }
        }
        Command::Projects { search } => {
            for project in client.list_projects(search.as_deref()).await? {
                println!("{:>10}  {}", project.id, project.name_with_namespace);
            }
        }
        Command::Tags { project } => {
            let mut names: Vec<String> = client
                .list_tags(project)
                .await?
                .into_iter()
                .map(|t| t.name)
                .collect();
            version::sort_desc(&mut names);
            for name in names {
                println!("{name}");
            }
        }
        Command::Whoami => {
            let user = client.current_user().await?;
            println!("{} (@{})", user.name, user.username);
        }
    }
    Ok(())
}
