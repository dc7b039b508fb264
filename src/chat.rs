//! `docent ask` and the interactive `docent chat` loop.

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{bail, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

use crate::completion::create_completer;
use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::models::Document;
use crate::retrieval::{Answer, Conversation, Orchestrator};
use crate::store::sqlite::SqliteStore;

/// Open the store and wire both providers into an [`Orchestrator`].
pub async fn open_orchestrator(config: &Config) -> Result<(Arc<SqliteStore>, Orchestrator)> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }
    if !config.completion.is_enabled() {
        bail!("Completion provider is disabled. Set [completion] provider in config.");
    }

    let store = Arc::new(db::open_store(config).await?);
    let orchestrator = Orchestrator::new(
        store.clone(),
        store.index(),
        create_embedder(&config.embedding)?,
        create_completer(&config.completion)?,
        config.retrieval.top_k,
    );
    Ok((store, orchestrator))
}

/// Answer one query and print the response with its sources.
pub async fn run_ask(config: &Config, query: &str, history: &str, user_id: i64) -> Result<()> {
    let (store, orchestrator) = open_orchestrator(config).await?;
    let answer = orchestrator.answer(user_id, query, history).await?;
    print_answer(&mut io::stdout(), &answer)?;
    store.pool().close().await;
    Ok(())
}

/// Interactive session on stdin/stdout.
pub async fn run_chat(config: &Config, user_id: i64) -> Result<()> {
    let (store, orchestrator) = open_orchestrator(config).await?;

    println!("docent chat");
    println!("Type 'exit' or 'quit' to end the session.");
    println!("Type 'clear' to clear the conversation history.");
    println!("---------------------------------------------");

    chat_session(
        &orchestrator,
        user_id,
        BufReader::new(tokio::io::stdin()),
        &mut io::stdout(),
    )
    .await?;

    store.pool().close().await;
    Ok(())
}

/// Read queries from `input` until EOF, `exit`, or `quit`.
///
/// The transcript is kept as `User:`/`Bot:` lines and sent with each query;
/// `clear` resets it. A failed answer is reported and the session goes on.
pub async fn chat_session<R, W>(
    orchestrator: &Orchestrator,
    user_id: i64,
    input: R,
    out: &mut W,
) -> Result<Conversation>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut conversation = Conversation::default();
    let mut lines = input.lines();
    loop {
        write!(out, "\nYou: ")?;
        out.flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "exit" | "quit" => {
                writeln!(out, "Goodbye!")?;
                break;
            }
            "clear" => {
                conversation.clear();
                writeln!(out, "Conversation history cleared.")?;
                continue;
            }
            _ => {}
        }

        conversation.push_user(line);
        match orchestrator
            .answer(user_id, line, conversation.history())
            .await
        {
            Ok(answer) => {
                conversation.push_bot(&answer.response);
                writeln!(out)?;
                print_answer(out, &answer)?;
            }
            Err(e) => writeln!(out, "Error: {}", e)?,
        }
    }
    Ok(conversation)
}

fn print_answer(out: &mut impl Write, answer: &Answer) -> io::Result<()> {
    writeln!(out, "Bot: {}", answer.response)?;
    if !answer.sources.is_empty() {
        writeln!(out)?;
        writeln!(out, "Sources:")?;
        for source in &answer.sources {
            writeln!(out, "  - {}", source_label(source))?;
        }
    }
    Ok(())
}

fn source_label(doc: &Document) -> String {
    match &doc.url {
        Some(url) if !url.is_empty() => format!("{} ({})", doc.display_name(), url),
        _ => doc.display_name(),
    }
}
