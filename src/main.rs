use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;

use discovery_agent::auth::provider::AadProvider;
use discovery_agent::cache::capability::ServiceCapability;
use discovery_agent::config::loader::load_config;
use discovery_agent::discovery::client::DiscoveryClient;
use discovery_agent::server;
use discovery_agent::session::ServiceSession;
use discovery_agent::utils::logging::{self, LogLevel};

#[derive(Parser)]
#[command(name = "discovery-agent", version, about = "Service discovery and token resolution agent")]
struct Cli {
    /// Path to the YAML config
    #[arg(long, default_value = "config.yaml", env = "DISCOVERY_AGENT_CONFIG")]
    config: String,

    #[arg(long, value_enum)]
    log_level: Option<LogLevel>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in (device code flow) and anchor the session
    Login,
    /// Sign out and drop all cached clients and tokens
    Logout,
    /// Show the persisted session anchor
    Status,
    /// Resolve and print every discovered capability
    Capabilities,
    /// Outlook mail operations
    Mail {
        #[command(subcommand)]
        action: MailAction,
    },
    /// List files on the MyFiles endpoint
    Files,
    /// Directory object of the signed-in user
    Me,
    /// Hold the session open and expose the metrics endpoint
    Serve,
}

#[derive(Subcommand)]
enum MailAction {
    List {
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 10)]
        page_size: usize,
    },
    Send {
        #[arg(long, required = true)]
        to: Vec<String>,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        body: String,
    },
    Delete {
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let cfg = load_config(&cli.config)?;
    logging::run(&cfg, cli.log_level);

    let session: ServiceSession<AadProvider, DiscoveryClient> =
        ServiceSession::from_config(&cfg).await?;

    match cli.command {
        Command::Login => {
            session.ensure_directory_client().await?;
            let auth = session.auth_session();
            println!("signed in as {}", auth.logged_in_user().await);
            println!("tenant: {}", auth.tenant_id().await);
        }
        Command::Logout => {
            session.sign_out().await?;
            println!("signed out");
        }
        Command::Status => {
            let auth = session.auth_session();
            let user = auth.logged_in_user().await;
            if user.is_empty() {
                println!("not signed in");
            } else {
                println!("user:      {user}");
                println!("tenant:    {}", auth.tenant_id().await);
                println!("authority: {}", auth.last_authority().await);
            }
        }
        Command::Capabilities => {
            for capability in ServiceCapability::ALL {
                match session.capability_info(capability).await {
                    Ok(info) => println!(
                        "{capability}: {} (resource {}, api {})",
                        info.service_endpoint_uri,
                        info.service_resource_id,
                        info.service_api_version
                    ),
                    Err(err) => println!("{capability}: unavailable ({err})"),
                }
            }
        }
        Command::Mail { action } => {
            let mail = session.ensure_mail_client().await?;
            match action {
                MailAction::List { page, page_size } => {
                    let messages = mail.list_messages(page, page_size).await?;
                    println!("{}", serde_json::to_string_pretty(&messages)?);
                }
                MailAction::Send { to, subject, body } => {
                    mail.send_message(&subject, &body, &to).await?;
                    println!("sent");
                }
                MailAction::Delete { id } => {
                    mail.delete_message(&id).await?;
                    println!("deleted");
                }
            }
        }
        Command::Files => {
            let files = session.ensure_files_client().await?;
            let items = files.list_files().await?;
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
        Command::Me => {
            let directory = session.ensure_directory_client().await?;
            let user = directory.me().await?;
            println!("{}", serde_json::to_string_pretty(&user)?);
        }
        Command::Serve => {
            tokio::select! {
                result = server::start(&cfg.settings) => result?,
                _ = tokio::signal::ctrl_c() => {
                    info!("received Ctrl+C, shutting down");
                }
            }
        }
    }

    Ok(())
}
