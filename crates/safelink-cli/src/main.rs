use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use safelink_core::archive::{format_countdown, ms_remaining, ArchiveStore};
use safelink_core::crypto::{self, SessionKey};
use safelink_core::evidence::{EvidenceKind, EvidenceStore, NewEvidence};
use safelink_core::links::{evidence_link_item, LinkClient, DEFAULT_BASE_URL};
use safelink_core::lock::VaultLockController;
use safelink_core::retention::{RetentionPolicy, RetentionSettings};
use safelink_core::settings::{load_settings, save_settings};
use safelink_core::storage::Storage;
use safelink_core::{backup, paths, risk};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "safelink")]
#[command(about = "SafeLink evidence vault", long_about = None)]
struct Cli {
    /// Storage root (defaults to the platform data dir, or $SAFELINK_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a note or a file to the vault
    Add {
        #[arg(long)]
        title: Option<String>,
        /// Note text (ignored when --file is given)
        #[arg(long)]
        content: Option<String>,
        /// Item type: note, image, scan, link, pdf, file
        #[arg(long, default_value = "note")]
        kind: String,
        /// Attach a binary file instead of note text
        #[arg(long)]
        file: Option<PathBuf>,
        /// MIME type for --file
        #[arg(long, default_value = "application/octet-stream")]
        mime: String,
        /// Encrypt the attachment with the session key (prompts for a passphrase)
        #[arg(long)]
        encrypt: bool,
    },

    /// List vault items
    List,

    /// Print one item; --out writes its attachment to a file
    Show {
        id: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Replace an item's note text in place
    Edit {
        id: String,
        #[arg(long)]
        content: String,
    },

    /// Soft-delete an item into Recently Deleted
    Remove { id: String },

    /// Permanently delete every item
    Clear {
        #[arg(long)]
        yes: bool,
    },

    /// Recently Deleted operations
    Trash {
        #[command(subcommand)]
        command: TrashCommands,
    },

    /// Score a message for sextortion/harassment risk signals
    Scan {
        /// Message text; use --file to scan a text file instead
        text: Option<String>,
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Encrypt the whole vault at rest
    Lock,

    /// Decrypt a locked vault
    Unlock,

    /// Export an encrypted .slvault backup
    Export {
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Import a .slvault backup, replacing the current vault
    Import { file: PathBuf },

    /// Set the retention policy and run a sweep immediately
    Retention {
        /// Age threshold in days; 0 disables retention
        #[arg(long)]
        days: u32,
        /// Permanently delete instead of moving to Recently Deleted
        #[arg(long)]
        hard: bool,
    },

    /// Destroy all local data (no undo)
    Wipe {
        #[arg(long)]
        yes: bool,
    },

    /// Tracked evidence links (companion service)
    Link {
        #[command(subcommand)]
        command: LinkCommands,
    },
}

#[derive(Subcommand)]
enum TrashCommands {
    /// List entries with their purge countdowns
    List,
    /// Move an entry back into the vault
    Restore { id: String },
    /// Remove the given entries, or everything with no ids
    Purge { ids: Vec<String> },
    /// Purge expired entries now
    Sweep,
}

#[derive(Subcommand)]
enum LinkCommands {
    /// Create a tracked redirect link and record it in the vault
    Create {
        #[arg(long, default_value = "evidence link")]
        label: String,
        #[arg(long)]
        target: String,
        #[arg(long, default_value = DEFAULT_BASE_URL)]
        base_url: String,
    },
    /// Show a link and its captured visitor events
    Show {
        id: String,
        #[arg(long, default_value = DEFAULT_BASE_URL)]
        base_url: String,
    },
}

struct App {
    storage: Arc<Storage>,
    evidence: EvidenceStore,
    archive: ArchiveStore,
}

impl App {
    /// Open the stores and run the startup housekeeping: expiry sweep plus
    /// one retention pass.
    async fn open(data_dir: Option<PathBuf>) -> Result<Self> {
        let root = match data_dir {
            Some(dir) => dir,
            None => paths::data_dir()?,
        };
        let storage = Arc::new(Storage::open(&root).await?);
        let evidence = EvidenceStore::open(storage.clone()).await?;
        let archive = ArchiveStore::open(storage.clone()).await;

        archive.purge_expired().await;
        let settings = load_settings(&storage).await;
        let outcome = RetentionPolicy::new(settings.retention)
            .run(&evidence, &archive)
            .await?;
        if outcome.archived + outcome.deleted > 0 {
            info!(
                archived = outcome.archived,
                deleted = outcome.deleted,
                "retention sweep ran at startup"
            );
        }

        Ok(Self {
            storage,
            evidence,
            archive,
        })
    }
}

fn parse_kind(s: &str) -> Result<EvidenceKind> {
    serde_json::from_value(Value::from(s)).map_err(|_| anyhow!("unknown item type: {s}"))
}

fn prompt_passphrase() -> Result<String> {
    let pass = rpassword::prompt_password("Passphrase: ")?;
    if pass.is_empty() {
        return Err(anyhow!("passphrase must not be empty"));
    }
    Ok(pass)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Add {
            title,
            content,
            kind,
            file,
            mime,
            encrypt,
        } => {
            let app = App::open(cli.data_dir).await?;
            let kind = parse_kind(&kind)?;
            let id = match file {
                Some(path) => add_file(&app, kind, title, &path, &mime, encrypt).await?,
                None => {
                    app.evidence
                        .add(NewEvidence {
                            kind,
                            title,
                            content,
                            ..Default::default()
                        })
                        .await?
                }
            };
            println!("{id}");
        }

        Commands::List => {
            let app = App::open(cli.data_dir).await?;
            for item in app.evidence.list().await {
                println!("{}", serde_json::to_string(&item)?);
            }
        }

        Commands::Show { id, out } => {
            let app = App::open(cli.data_dir).await?;
            let item = app
                .evidence
                .get(&id)
                .await
                .ok_or_else(|| anyhow!("no item with id {id}"))?;
            println!("{}", serde_json::to_string_pretty(&item)?);
            if let Some(path) = out {
                let blob = app
                    .storage
                    .get_blob(&id)
                    .await?
                    .ok_or_else(|| anyhow!("item {id} has no attachment"))?;
                std::fs::write(&path, blob)
                    .with_context(|| format!("write {}", path.display()))?;
                println!("attachment written to {}", path.display());
            }
        }

        Commands::Edit { id, content } => {
            let app = App::open(cli.data_dir).await?;
            if !app.evidence.replace_content(&id, content).await? {
                return Err(anyhow!("no item with id {id}"));
            }
            println!("updated {id}");
        }

        Commands::Remove { id } => {
            let app = App::open(cli.data_dir).await?;
            let item = app
                .evidence
                .get(&id)
                .await
                .ok_or_else(|| anyhow!("no item with id {id}"))?;
            app.archive.archive(vec![item], None).await;
            app.evidence.remove(&id).await?;
            println!("moved to Recently Deleted (restorable for 10 minutes)");
        }

        Commands::Clear { yes } => {
            if !yes {
                return Err(anyhow!("refusing to clear without --yes"));
            }
            let app = App::open(cli.data_dir).await?;
            app.evidence.clear().await?;
            app.storage.clear_blobs().await?;
            println!("vault cleared");
        }

        Commands::Trash { command } => {
            let app = App::open(cli.data_dir).await?;
            match command {
                TrashCommands::List => {
                    for entry in app.archive.list().await {
                        let left = ms_remaining(entry.archived_at, entry.ttl_ms);
                        println!(
                            "{}  {}  {}",
                            entry.id,
                            format_countdown(left),
                            entry.item.title.as_deref().unwrap_or("(untitled)")
                        );
                    }
                }
                TrashCommands::Restore { id } => {
                    let item = app
                        .archive
                        .restore(&id)
                        .await
                        .ok_or_else(|| anyhow!("no archived entry with id {id}"))?;
                    app.evidence.replace_all({
                        let mut items = app.evidence.list().await;
                        items.insert(0, item);
                        items
                    })
                    .await?;
                    println!("restored {id}");
                }
                TrashCommands::Purge { ids } => {
                    let remaining = if ids.is_empty() {
                        app.archive.purge(None).await
                    } else {
                        // Purged for good, so the attachments go too.
                        for id in &ids {
                            app.storage.delete_blob(id).await?;
                        }
                        app.archive.purge(Some(&ids)).await
                    };
                    println!("{} entries remain", remaining.len());
                }
                TrashCommands::Sweep => {
                    let kept = app.archive.purge_expired().await;
                    println!("{} entries remain", kept.len());
                }
            }
        }

        Commands::Scan { text, file } => {
            let message = match (text, file) {
                (Some(t), None) => t,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("read {}", path.display()))?,
                _ => return Err(anyhow!("pass message text or --file, not both")),
            };
            let report = risk::score(&message);
            println!("{}", serde_json::to_string_pretty(&report)?);
        }

        Commands::Lock => {
            let app = App::open(cli.data_dir).await?;
            let lock = VaultLockController::new(app.storage.clone());
            let pass = prompt_passphrase()?;
            let count = lock.lock(&app.evidence, &pass).await?;
            println!("locked {count} items");
        }

        Commands::Unlock => {
            let app = App::open(cli.data_dir).await?;
            let lock = VaultLockController::new(app.storage.clone());
            let pass = prompt_passphrase()?;
            match lock.unlock(&app.evidence, &pass).await {
                Ok(count) => println!("unlocked {count} items"),
                Err(e) => return Err(e.context("invalid passphrase")),
            }
        }

        Commands::Export { out } => {
            let app = App::open(cli.data_dir).await?;
            let pass = prompt_passphrase()?;
            let settings = load_settings(&app.storage).await;
            let bytes =
                backup::export(&app.evidence, &app.archive, settings.retention, &pass).await?;
            let path = out.unwrap_or_else(|| PathBuf::from(backup::suggested_filename()));
            std::fs::write(&path, bytes).with_context(|| format!("write {}", path.display()))?;
            println!("exported to {}", path.display());
        }

        Commands::Import { file } => {
            let app = App::open(cli.data_dir).await?;
            let pass = prompt_passphrase()?;
            let bytes =
                std::fs::read(&file).with_context(|| format!("read {}", file.display()))?;
            let outcome =
                backup::import(&bytes, &pass, &app.evidence, &app.archive, &app.storage).await?;
            println!(
                "imported {} items ({} into Recently Deleted)",
                outcome.evidence, outcome.archives
            );
        }

        Commands::Retention { days, hard } => {
            let app = App::open(cli.data_dir).await?;
            let retention = RetentionSettings { days, hard };
            let mut settings = load_settings(&app.storage).await;
            settings.retention = retention;
            save_settings(&app.storage, &settings).await?;
            let outcome = RetentionPolicy::new(retention)
                .run(&app.evidence, &app.archive)
                .await?;
            println!(
                "retention set to {days} day(s), hard={hard}; swept {} item(s)",
                outcome.archived + outcome.deleted
            );
        }

        Commands::Wipe { yes } => {
            if !yes {
                return Err(anyhow!("refusing to wipe without --yes"));
            }
            let app = App::open(cli.data_dir).await?;
            app.storage.wipe_everything().await?;
            println!("all local data destroyed");
        }

        Commands::Link { command } => match command {
            LinkCommands::Create {
                label,
                target,
                base_url,
            } => {
                let app = App::open(cli.data_dir).await?;
                let client = LinkClient::new(base_url);
                let link = client.create_link(&label, &target).await?;
                let id = app.evidence.add(evidence_link_item(&link, &target)).await?;
                println!("link {} -> {}{}", link.id, client.base_url(), link.url);
                println!("vault note {id}");
            }
            LinkCommands::Show { id, base_url } => {
                let client = LinkClient::new(base_url);
                let link = client.fetch_link(&id).await?;
                println!("{}", serde_json::to_string_pretty(&link)?);
            }
        },
    }
    Ok(())
}

/// Attach a binary file: blob goes into id-keyed blob storage, the item
/// carries mime/size/hash metadata (and the encryption flag when the session
/// key is used).
async fn add_file(
    app: &App,
    kind: EvidenceKind,
    title: Option<String>,
    path: &PathBuf,
    mime: &str,
    encrypt: bool,
) -> Result<String> {
    let data = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string());

    let mut metadata = serde_json::Map::new();
    metadata.insert("mime".into(), Value::from(mime));
    metadata.insert("size".into(), Value::from(data.len() as u64));
    metadata.insert("sha256".into(), Value::from(crypto::sha256_hex(&data)));
    if let Some(n) = &name {
        metadata.insert("name".into(), Value::from(n.clone()));
    }

    let stored = if encrypt {
        let pass = prompt_passphrase()?;
        let mut settings = load_settings(&app.storage).await;
        let session = match &settings.enc_salt_b64 {
            Some(salt) => SessionKey::from_salt_b64(&pass, salt)
                .map_err(|_| anyhow!("stored encryption salt is corrupt"))?,
            None => {
                let session = SessionKey::derive(&pass);
                settings.enc_salt_b64 = Some(session.salt_b64());
                save_settings(&app.storage, &settings).await?;
                session
            }
        };
        let pkg = session.encrypt_blob(&data, mime, name.as_deref())?;
        metadata.insert("encrypted".into(), Value::from(true));
        metadata.insert("iv".into(), Value::from(pkg.iv.clone()));
        serde_json::to_vec(&pkg)?
    } else {
        data
    };

    let id = app
        .evidence
        .add(NewEvidence {
            kind,
            title,
            content: None,
            metadata,
        })
        .await?;
    app.storage.put_blob(&id, &stored).await?;
    Ok(id)
}
