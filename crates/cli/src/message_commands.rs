use std::{
    io::Write,
    time::{Duration, Instant},
};

use {
    murmur_config::MurmurConfig,
    murmur_messages::{EncryptedRepository, Message, conversation},
    murmur_vault::{KeyLifecycle, VaultError},
    tokio_util::sync::CancellationToken,
    tracing::warn,
};

use crate::{Commands, bootstrap};

pub async fn handle(command: Commands, config: &MurmurConfig) -> anyhow::Result<()> {
    if let Commands::Status = command {
        return status(config).await;
    }

    let repo = bootstrap::open_repository(config).await?;
    match command {
        Commands::Send { text } => {
            let id = conversation::send_message(&repo, &text).await?;
            println!("{id}");
        },
        Commands::Reply { delay_ms } => {
            let id = conversation::simulate_reply(&repo, Duration::from_millis(delay_ms)).await?;
            println!("{id}");
        },
        Commands::List { json } => list(&repo, json).await?,
        Commands::Page { size, pages } => {
            page(&repo, size.unwrap_or(config.paging.page_size), pages).await?;
        },
        Commands::Count => println!("{}", repo.message_count().await?),
        Commands::MaxTimestamp => println!("{}", repo.max_timestamp().await?),
        Commands::Seed { count } => seed(&repo, count).await?,
        Commands::Clear => {
            let removed = repo.delete_all_messages().await?;
            println!("Deleted {removed} message(s).");
        },
        Commands::Status => {},
    }
    Ok(())
}

fn format_line(message: &Message) -> String {
    let direction = if message.is_sent { ">" } else { "<" };
    format!(
        "{:>6}  {}  {direction} {}",
        message.id, message.timestamp, message.content
    )
}

fn report_unreadable(ids: &[i64]) {
    if !ids.is_empty() {
        warn!(count = ids.len(), ?ids, "skipped unreadable messages");
        eprintln!("{} message(s) could not be decrypted: {ids:?}", ids.len());
    }
}

async fn list(repo: &EncryptedRepository, json: bool) -> anyhow::Result<()> {
    let snapshot = repo.snapshot().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    if snapshot.messages.is_empty() {
        println!("No messages.");
    }
    for message in &snapshot.messages {
        println!("{}", format_line(message));
    }
    report_unreadable(&snapshot.unreadable);
    Ok(())
}

async fn page(repo: &EncryptedRepository, size: usize, pages: usize) -> anyhow::Result<()> {
    let mut pager = repo.messages_paged(size);
    for n in 1..=pages {
        let Some(batch) = pager.next_page().await? else {
            break;
        };
        println!("-- page {n} ({} message(s))", batch.len());
        for message in &batch {
            println!("{}", format_line(message));
        }
    }
    if pager.is_exhausted() {
        println!("-- end of history");
    }
    report_unreadable(pager.unreadable());
    Ok(())
}

async fn seed(repo: &EncryptedRepository, count: usize) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nstopping after the current chunk...");
            on_signal.cancel();
        }
    });

    let started = Instant::now();
    let result = conversation::insert_large_dataset(
        repo,
        count,
        |percent| {
            eprint!("\rseeding: {percent:>3}%");
            std::io::stderr().flush().ok();
        },
        &cancel,
    )
    .await;
    signal_task.abort();
    eprintln!();

    let report = result?;
    if report.cancelled {
        println!(
            "Cancelled: wrote {} of {} message(s).",
            report.written, report.total
        );
    } else {
        println!(
            "Inserted {} message(s) in {:.1}s.",
            report.written,
            started.elapsed().as_secs_f64()
        );
    }
    Ok(())
}

async fn status(config: &MurmurConfig) -> anyhow::Result<()> {
    let keys = bootstrap::key_manager(config).await?;
    let outcome = keys.cipher_engine().await;

    println!("Vault backend: {}", keys.vault_backend());
    println!("Data key:      {}", keys.status().await);
    println!(
        "Data dir:      {}",
        config.storage.resolved_data_dir()?.display()
    );

    match outcome {
        Ok(engine) => println!("Cipher:        {}", engine.algorithm()),
        Err(VaultError::VaultUnavailable(reason)) => {
            println!("Vault unavailable (retry later): {reason}");
        },
        Err(e) => {
            println!("Error:         {e}");
            if keys.status().await == KeyLifecycle::Unusable {
                println!("Existing messages cannot be decrypted with the current root key.");
            }
        },
    }
    Ok(())
}
