//! Strongroom CLI - command line front end for shared and personal vaults.
//!
//! The CLI stands in for the routing layer: `--user` is taken as the
//! authenticated principal and every command goes through the same
//! service calls a server would make.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use zeroize::Zeroizing;

use strongroom_common::{ClientMeta, UserId, UserProfile, VaultId};
use strongroom_storage::{SqliteRepository, VaultRepository};
use strongroom_vault::{
    require_principal, FileRequest, HistoryRequest, NewFile, NewVault, PersonalItemRequest,
    Preview, ServiceConfig, SystemClock, UnlockRequest, VaultOperationService,
};

#[derive(Parser)]
#[command(name = "strongroom")]
#[command(about = "Strongroom - Shared encrypted vaults with quorum unlock")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// SQLite database file.
    #[arg(long, default_value = "strongroom.db")]
    db: PathBuf,

    /// JSON service configuration.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Acting user id.
    #[arg(short, long)]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage user profiles.
    #[command(subcommand)]
    User(UserCommand),

    /// Personal vault of the acting user.
    #[command(subcommand)]
    Personal(PersonalCommand),

    /// Shared vaults.
    #[command(subcommand)]
    Vault(VaultCommand),
}

#[derive(Subcommand)]
enum UserCommand {
    /// Register or update a display profile.
    Add {
        #[arg(long)]
        id: String,

        #[arg(long)]
        name: String,

        #[arg(long)]
        email: Option<String>,
    },
}

#[derive(Subcommand)]
enum PersonalCommand {
    /// Set the personal vault password (once).
    SetPassword,

    /// Encrypt a file into the personal vault.
    Store {
        /// Source file.
        #[arg(short, long)]
        file: PathBuf,

        /// MIME type (default: application/octet-stream).
        #[arg(short, long)]
        mime: Option<String>,
    },

    /// Decrypt an item to a file.
    Get {
        #[arg(short, long)]
        item: String,

        /// Destination file.
        #[arg(short, long)]
        out: PathBuf,
    },
}

#[derive(Subcommand)]
enum VaultCommand {
    /// Create a shared vault administered by the acting user.
    Create {
        #[arg(short, long)]
        name: String,

        /// Member user ids (repeatable).
        #[arg(short, long = "member")]
        members: Vec<String>,

        /// PIN approvals needed to unlock.
        #[arg(short, long)]
        threshold: Option<u32>,

        /// Seconds the vault stays open after unlocking.
        #[arg(long)]
        ttl: Option<u64>,
    },

    /// Add a member (admin only).
    AddMember {
        #[arg(long)]
        vault: String,

        #[arg(long)]
        member: String,
    },

    /// Set the acting user's unlock PIN.
    SetPin {
        #[arg(long)]
        vault: String,
    },

    /// Approve unlocking with the acting user's PIN.
    Unlock {
        #[arg(long)]
        vault: String,
    },

    /// Lock the vault now.
    Lock {
        #[arg(long)]
        vault: String,
    },

    /// Show approvals and lock state.
    Status {
        #[arg(long)]
        vault: String,
    },

    /// Encrypt a file into the vault.
    Upload {
        #[arg(long)]
        vault: String,

        /// Source file.
        #[arg(short, long)]
        file: PathBuf,

        #[arg(short, long)]
        mime: Option<String>,
    },

    /// Decrypt a file to disk.
    Download {
        #[arg(long)]
        vault: String,

        #[arg(long)]
        file_id: String,

        /// Destination file.
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Print a preview of a file.
    Preview {
        #[arg(long)]
        vault: String,

        #[arg(long)]
        file_id: String,
    },

    /// List files.
    Files {
        #[arg(long)]
        vault: String,
    },

    /// Show history as JSON.
    History {
        #[arg(long)]
        vault: String,

        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        offset: Option<usize>,
    },

    /// Delete the vault (admin only).
    Delete {
        #[arg(long)]
        vault: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging; RUST_LOG overrides the verbosity flag
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(cli.config.as_deref()).await?;
    let repo: Arc<dyn VaultRepository> = Arc::new(
        SqliteRepository::open(&cli.db)
            .with_context(|| format!("Failed to open database {}", cli.db.display()))?,
    );
    info!(db = %cli.db.display(), backend = repo.name(), "Repository opened");

    let service = VaultOperationService::new(repo.clone(), Arc::new(SystemClock), config)
        .context("Invalid service configuration")?;
    let meta = ClientMeta {
        ip_address: None,
        user_agent: Some(format!("strongroom-cli/{}", env!("CARGO_PKG_VERSION"))),
    };

    match cli.command {
        Commands::User(UserCommand::Add { id, name, email }) => {
            cmd_user_add(repo.as_ref(), id, name, email).await
        }
        Commands::Personal(command) => {
            let user = principal(cli.user.as_deref())?;
            cmd_personal(&service, &user, command).await
        }
        Commands::Vault(command) => {
            let user = principal(cli.user.as_deref())?;
            cmd_vault(&service, &user, &meta, command).await
        }
    }
}

fn principal(user: Option<&str>) -> Result<UserId> {
    require_principal(user).context("Pass --user to act as a principal")
}

async fn load_config(path: Option<&Path>) -> Result<ServiceConfig> {
    match path {
        Some(path) => {
            let json = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            ServiceConfig::from_json(&json).context("Invalid config file")
        }
        None => Ok(ServiceConfig::default()),
    }
}

/// Prompt for a secret without echo.
fn prompt_secret(prompt: &str) -> Result<Zeroizing<String>> {
    let secret = rpassword::prompt_password(prompt).context("Failed to read input")?;
    Ok(Zeroizing::new(secret))
}

fn file_name_of(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .context("Source path has no file name")
}

async fn read_new_file(path: &Path, mime: Option<String>) -> Result<NewFile> {
    let content = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(NewFile::new(file_name_of(path)?, mime, content)?)
}

async fn cmd_user_add(
    repo: &dyn VaultRepository,
    id: String,
    name: String,
    email: Option<String>,
) -> Result<()> {
    let id = UserId::new(id)?;
    repo.upsert_user(UserProfile {
        id: id.clone(),
        display_name: name,
        email,
    })
    .await
    .context("Failed to save user")?;

    println!("User saved: {}", id);
    Ok(())
}

async fn cmd_personal(
    service: &VaultOperationService,
    user: &UserId,
    command: PersonalCommand,
) -> Result<()> {
    match command {
        PersonalCommand::SetPassword => {
            let password = prompt_secret("New personal vault password: ")?;
            let confirm = prompt_secret("Confirm password: ")?;
            if password != confirm {
                anyhow::bail!("Passwords do not match");
            }
            service
                .set_personal_password(user, &password)
                .await
                .context("Failed to set password")?;
            println!("Personal vault password set.");
        }

        PersonalCommand::Store { file, mime } => {
            let new_file = read_new_file(&file, mime).await?;
            let password = prompt_secret("Personal vault password: ")?;
            let item = service
                .store_personal_item(user, password, new_file)
                .await
                .context("Failed to store item")?;
            println!("Stored item: {}", item);
        }

        PersonalCommand::Get { item, out } => {
            let password = prompt_secret("Personal vault password: ")?;
            let request = PersonalItemRequest {
                item_id: Some(item),
                password: Some(password.as_str().to_owned()),
            }
            .validate()?;
            let download = service
                .download_personal_item(user, request)
                .await
                .context("Failed to read item")?;
            tokio::fs::write(&out, download.content.as_bytes())
                .await
                .context("Failed to write output file")?;
            println!(
                "Extracted {} to {} ({} bytes)",
                download.file_name,
                out.display(),
                download.content_length()
            );
        }
    }
    Ok(())
}

async fn cmd_vault(
    service: &VaultOperationService,
    user: &UserId,
    meta: &ClientMeta,
    command: VaultCommand,
) -> Result<()> {
    match command {
        VaultCommand::Create {
            name,
            members,
            threshold,
            ttl,
        } => {
            let members = members
                .into_iter()
                .map(UserId::new)
                .collect::<strongroom_common::Result<Vec<_>>>()?;
            let vault = service
                .create_vault(
                    user,
                    NewVault {
                        name,
                        members,
                        unlock_threshold: threshold,
                        unlock_ttl_secs: ttl,
                    },
                )
                .await
                .context("Failed to create vault")?;

            println!("Vault created successfully!");
            println!("  ID: {}", vault.id);
            println!("  Members: {}", vault.participants().len());
            println!("  Unlock threshold: {}", vault.unlock_threshold);
            println!("  Unlock TTL: {}s", vault.unlock_ttl_secs);
        }

        VaultCommand::AddMember { vault, member } => {
            let added = service
                .add_member(user, &VaultId::new(vault)?, &UserId::new(member)?, meta)
                .await
                .context("Failed to add member")?;
            println!("{}", if added { "Member added." } else { "Already a member." });
        }

        VaultCommand::SetPin { vault } => {
            let pin = prompt_secret("New unlock PIN: ")?;
            let confirm = prompt_secret("Confirm PIN: ")?;
            if pin != confirm {
                anyhow::bail!("PINs do not match");
            }
            service
                .unlock()
                .set_pin(&VaultId::new(vault)?, user, &pin)
                .await
                .context("Failed to set PIN")?;
            println!("PIN set.");
        }

        VaultCommand::Unlock { vault } => {
            let pin = prompt_secret("Unlock PIN: ")?;
            let submission = UnlockRequest {
                vault_id: Some(vault),
                pin: Some(pin.as_str().to_owned()),
            }
            .validate()?;
            let progress = service
                .unlock()
                .submit_pin(&submission.vault_id, user, &submission.pin, meta)
                .await
                .context("Unlock failed")?;
            println!("{}", serde_json::to_string_pretty(&progress)?);
        }

        VaultCommand::Lock { vault } => {
            let locked = service
                .unlock()
                .lock(&VaultId::new(vault)?, user, meta)
                .await
                .context("Failed to lock vault")?;
            println!("{}", if locked { "Vault locked." } else { "Vault was already locked." });
        }

        VaultCommand::Status { vault } => {
            let progress = service
                .unlock()
                .progress(&VaultId::new(vault)?, user)
                .await?;
            println!("{}", serde_json::to_string_pretty(&progress)?);
        }

        VaultCommand::Upload { vault, file, mime } => {
            let new_file = read_new_file(&file, mime).await?;
            let password = prompt_secret("File password: ")?;
            let summary = service
                .upload_file(user, &VaultId::new(vault)?, password, new_file, meta)
                .await
                .context("Failed to upload file")?;
            println!("Uploaded {} ({} bytes)", summary.id, summary.size);
        }

        VaultCommand::Download {
            vault,
            file_id,
            out,
        } => {
            let password = prompt_secret("File password: ")?;
            let request = FileRequest {
                vault_id: Some(vault),
                file_id: Some(file_id),
                password: Some(password.as_str().to_owned()),
            }
            .validate()?;
            let download = service
                .download_file(user, request, meta)
                .await
                .context("Failed to download file")?;
            tokio::fs::write(&out, download.content.as_bytes())
                .await
                .context("Failed to write output file")?;
            println!(
                "Downloaded {} to {} ({} bytes)",
                download.file_name,
                out.display(),
                download.content_length()
            );
        }

        VaultCommand::Preview { vault, file_id } => {
            let password = prompt_secret("File password: ")?;
            let request = FileRequest {
                vault_id: Some(vault),
                file_id: Some(file_id),
                password: Some(password.as_str().to_owned()),
            }
            .validate()?;
            match service.preview_file(user, request, meta).await? {
                Preview::Text(text) => println!("{}", text.content),
                Preview::Inline(file) => println!(
                    "{} ({}, {} bytes) is not previewable as text",
                    file.file_name,
                    file.mime_type,
                    file.content_length()
                ),
            }
        }

        VaultCommand::Files { vault } => {
            let files = service.list_files(user, &VaultId::new(vault)?).await?;
            if files.is_empty() {
                println!("Vault is empty.");
            }
            for file in files {
                println!(
                    "  {}  {} ({}, {} bytes)",
                    file.id, file.original_name, file.mime_type, file.size
                );
            }
        }

        VaultCommand::History {
            vault,
            limit,
            offset,
        } => {
            let query = HistoryRequest {
                vault_id: Some(vault),
                limit,
                offset,
            }
            .validate(service.config())?;
            let page = service.list_history(user, query).await?;
            println!("{}", serde_json::to_string_pretty(&page)?);
        }

        VaultCommand::Delete { vault } => {
            let deleted = service
                .deactivate_vault(user, &VaultId::new(vault)?, meta)
                .await
                .context("Failed to delete vault")?;
            println!("{}", if deleted { "Vault deleted." } else { "Vault already deleted." });
        }
    }
    Ok(())
}
