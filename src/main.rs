mod client;
mod protocol;
mod render;
mod stream;
mod ui;

use clap::{Parser, Subcommand};
use client::ApiClient;
use protocol::{CreateProjectRequest, LoginRequest, RegisterRequest};
use tracing::info;
use tracing_subscriber::EnvFilter;

type MainResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

#[derive(Parser)]
#[command(name = "runway", version, about = "Terminal client for agent runs on a project hub")]
struct Cli {
    /// Base URL of the platform API.
    #[arg(long, env = "RUNWAY_BASE_URL", default_value = "http://localhost:8000")]
    base_url: String,
    /// Access token, as printed by `runway login`.
    #[arg(long, env = "RUNWAY_TOKEN")]
    token: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an account and print its access token.
    Register {
        #[arg(long)]
        email: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Log in and print an access token.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    /// List your projects.
    Projects,
    /// Create a project backed by a Git repository.
    Create {
        #[arg(long)]
        repo_url: String,
        #[arg(long, default_value = "main")]
        branch: String,
        #[arg(long)]
        init_prompt: String,
    },
    /// Provision the execution environment for a project.
    Provision { project_id: String },
    /// Start an agent run and watch its log stream.
    Run { project_id: String },
    /// Watch the log stream of an existing run.
    Watch { project_id: String, run_id: String },
    /// Show the state of a run.
    Status { project_id: String, run_id: String },
}

#[tokio::main]
async fn main() -> MainResult<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let interactive = matches!(&cli.command, Command::Run { .. } | Command::Watch { .. });
    let _log_guard = init_tracing(interactive)?;

    let client = ApiClient::new(&cli.base_url, cli.token);

    match cli.command {
        Command::Register {
            email,
            username,
            password,
        } => {
            let auth = client
                .register(&RegisterRequest {
                    email,
                    username,
                    password,
                })
                .await?;
            println!("{}", auth.access_token);
        }
        Command::Login { email, password } => {
            let auth = client.login(&LoginRequest { email, password }).await?;
            println!("{}", auth.access_token);
        }
        Command::Projects => {
            for project in client.list_projects().await? {
                let branch = project.branch.as_deref().unwrap_or("main");
                println!(
                    "[{}] {}@{} ({})",
                    project.status, project.repo_url, branch, project.id
                );
            }
        }
        Command::Create {
            repo_url,
            branch,
            init_prompt,
        } => {
            let project = client
                .create_project(&CreateProjectRequest {
                    repo_url,
                    branch,
                    init_prompt,
                })
                .await?;
            println!("created project {}", project.id);
        }
        Command::Provision { project_id } => {
            let provisioned = client.provision_project(&project_id).await?;
            println!(
                "container {} ({})",
                provisioned.container_id, provisioned.status
            );
        }
        Command::Run { project_id } => {
            let started = client.start_run(&project_id).await?;
            info!(
                run_id = %started.run_id,
                status = started.status.label(),
                phase = %started.phase,
                "run started"
            );
            ui::run_watch(client, project_id, started.run_id).await?;
        }
        Command::Watch { project_id, run_id } => {
            ui::run_watch(client, project_id, run_id).await?;
        }
        Command::Status { project_id, run_id } => {
            let status = client.run_status(&project_id, &run_id).await?;
            println!("status:   {}", status.status.label());
            println!("phase:    {}", status.phase);
            if let Some(created) = &status.created_at {
                println!("created:  {}", created);
            }
            if let Some(started) = &status.started_at {
                println!("started:  {}", started);
            }
            if let Some(finished) = &status.finished_at {
                println!("finished: {}", finished);
            }
            if let Some(error) = &status.error_message {
                println!("error:    {}", error);
            }
        }
    }

    Ok(())
}

fn init_tracing(
    interactive: bool,
) -> MainResult<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if interactive {
        // The TUI owns the terminal, so diagnostics go to a file instead.
        let file = tracing_appender::rolling::never(std::env::temp_dir(), "runway.log");
        let (writer, guard) = tracing_appender::non_blocking(file);
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(writer)
            .with_ansi(false)
            .try_init()?;
        Ok(Some(guard))
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()?;
        Ok(None)
    }
}
