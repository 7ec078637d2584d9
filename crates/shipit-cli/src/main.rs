//! Shipit CLI tool.

use clap::{Parser, Subcommand};

mod commands;

use commands::Client;

#[derive(Parser)]
#[command(name = "shipit")]
#[command(about = "Shipit deployment CLI", long_about = None)]
struct Cli {
    /// API server URL
    #[arg(long, env = "SHIPIT_API_URL", default_value = "http://localhost:3000")]
    api_url: String,

    /// Email to act as
    #[arg(long, env = "SHIPIT_EMAIL")]
    email: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage projects
    Projects {
        #[command(subcommand)]
        command: ProjectCommands,
    },
    /// Manage deploys
    Deploys {
        #[command(subcommand)]
        command: DeployCommands,
    },
    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        #[arg(default_value = "shipit.kdl")]
        path: String,
    },
}

#[derive(Subcommand)]
enum ProjectCommands {
    /// List projects
    List,
    /// Create a project
    Create {
        name: String,
        /// Source repository as owner/name
        repository: String,
    },
    /// List stages of a project
    Stages {
        /// Project permalink
        project: String,
    },
}

#[derive(Subcommand)]
enum DeployCommands {
    /// List deploys of a project
    List {
        /// Project permalink
        project: String,
        #[arg(long, default_value = "1")]
        page: usize,
    },
    /// Show currently active deploys
    Active,
    /// Create a deploy
    Create {
        /// Project permalink
        project: String,
        /// Stage id
        stage: String,
        /// Git reference to deploy
        reference: String,
    },
    /// Show a deploy
    Show {
        project: String,
        id: String,
    },
    /// Cancel a deploy
    Cancel {
        project: String,
        id: String,
    },
    /// Approve a pending deploy as the buddy
    Approve {
        project: String,
        id: String,
    },
    /// Reject a pending deploy
    Reject {
        project: String,
        id: String,
        /// Why the deploy is rejected
        #[arg(long)]
        reason: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = Client::new(&cli.api_url, cli.email.as_deref());

    match cli.command {
        Commands::Projects { command } => match command {
            ProjectCommands::List => {
                commands::projects::list(&client).await?;
            }
            ProjectCommands::Create { name, repository } => {
                commands::projects::create(&client, &name, &repository).await?;
            }
            ProjectCommands::Stages { project } => {
                commands::projects::stages(&client, &project).await?;
            }
        },
        Commands::Deploys { command } => match command {
            DeployCommands::List { project, page } => {
                commands::deploys::list(&client, &project, page).await?;
            }
            DeployCommands::Active => {
                commands::deploys::active(&client).await?;
            }
            DeployCommands::Create {
                project,
                stage,
                reference,
            } => {
                commands::deploys::create(&client, &project, &stage, &reference).await?;
            }
            DeployCommands::Show { project, id } => {
                commands::deploys::show(&client, &project, &id).await?;
            }
            DeployCommands::Cancel { project, id } => {
                commands::deploys::cancel(&client, &project, &id).await?;
            }
            DeployCommands::Approve { project, id } => {
                commands::deploys::approve(&client, &project, &id).await?;
            }
            DeployCommands::Reject {
                project,
                id,
                reason,
            } => {
                commands::deploys::reject(&client, &project, &id, &reason).await?;
            }
        },
        Commands::Validate { path } => {
            commands::validate(&path)?;
        }
    }

    Ok(())
}
