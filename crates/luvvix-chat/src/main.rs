//! # luvvix-chat
//!
//! Command-line front end for the LuvviX secure chat services. Every command
//! runs as one user: the first run on a device generates that user's key pair
//! and publishes it to the directory.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use luvvix_chat::{telemetry, ChatConfig, ChatError, SecureChat};
use luvvix_shared::{ConversationId, UserId};

#[derive(Parser)]
#[command(name = "luvvix-chat")]
#[command(about = "LuvviX end-to-end encrypted chat")]
struct Args {
    /// User to act as
    #[arg(long, env = "LUVVIX_USER_ID")]
    user: UserId,

    /// Shared chat database (overrides LUVVIX_STORE_PATH)
    #[arg(long)]
    store: Option<PathBuf>,

    /// Device key vault (overrides LUVVIX_KEYSTORE_PATH)
    #[arg(long)]
    keystore: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show this device's key fingerprint
    Whoami,
    /// List conversations as JSON, most recent first
    Conversations,
    /// Open (or reuse) a private conversation with another user
    Dm { other: UserId },
    /// Create a group conversation
    Group {
        name: String,
        #[arg(required = true)]
        members: Vec<UserId>,
    },
    /// Rename a conversation
    Rename {
        conversation: ConversationId,
        name: String,
    },
    /// Send a text message
    Send {
        conversation: ConversationId,
        text: String,
    },
    /// Print the most recent messages of a conversation as JSON
    History {
        conversation: ConversationId,
        #[arg(long)]
        limit: Option<u32>,
    },
    /// Print new messages as they arrive, until Ctrl-C
    Watch { conversation: ConversationId },
    /// Save a contact under a private name
    AddContact {
        contact: UserId,
        #[arg(long)]
        name: Option<String>,
    },
    /// List contacts as JSON
    Contacts,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_tracing();
    let args = Args::parse();

    let mut config = ChatConfig::from_env();
    if args.store.is_some() {
        config.store_path = args.store;
    }
    if args.keystore.is_some() {
        config.keystore_path = args.keystore;
    }
    info!(user = %args.user, codec = ?config.codec, "starting luvvix-chat");

    let chat = SecureChat::from_config(&config, args.user)
        .await
        .map_err(explain)
        .context("could not start session")?;

    run(&chat, args.command).await.map_err(explain)
}

async fn run(chat: &SecureChat, command: Command) -> Result<(), ChatError> {
    let me = chat.user_id();

    match command {
        Command::Whoami => {
            println!("user:        {me}");
            println!("fingerprint: {}", chat.fingerprint());
            println!("public key:  {}", chat.public_key());
        }
        Command::Conversations => {
            let conversations = chat.conversations().list_conversations(me).await?;
            print_json(&conversations);
        }
        Command::Dm { other } => {
            let id = chat.conversations().open_private_conversation(me, other).await?;
            println!("{id}");
        }
        Command::Group { name, members } => {
            let id = chat
                .conversations()
                .create_group_conversation(me, &name, &members)
                .await?;
            println!("{id}");
        }
        Command::Rename { conversation, name } => {
            chat.conversations()
                .rename_conversation(conversation, &name, me)
                .await?;
        }
        Command::Send { conversation, text } => {
            let sent = chat.messages().send_message(conversation, me, &text).await?;
            println!("{}", sent.id);
        }
        Command::History {
            conversation,
            limit,
        } => {
            let messages = match limit {
                Some(limit) => chat.messages().list_recent(conversation, limit).await?,
                None => chat.messages().list_messages(conversation).await?,
            };
            print_json(&messages);
        }
        Command::Watch { conversation } => {
            let subscription = chat
                .messages()
                .subscribe(conversation, |m| {
                    println!("[{}] {}: {}", m.sent_at.format("%H:%M:%S"), m.sender_id.short(), m.display_text());
                })
                .await?;
            info!(%conversation, "watching, press Ctrl-C to stop");
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %e, "could not listen for Ctrl-C");
            }
            subscription.unsubscribe();
        }
        Command::AddContact { contact, name } => {
            let entry = chat
                .contacts()
                .add_contact(me, contact, name.as_deref())
                .await?;
            print_json(&entry);
        }
        Command::Contacts => {
            let contacts = chat.contacts().list_contacts(me).await?;
            print_json(&contacts);
        }
    }

    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(e) => tracing::error!(error = %e, "could not serialise output"),
    }
}

/// Log the technical error and surface the user-facing wording.
fn explain(e: ChatError) -> anyhow::Error {
    tracing::debug!(error = %e, retryable = e.is_retryable(), "command failed");
    anyhow::anyhow!(e.user_message())
}
