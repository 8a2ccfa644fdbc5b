//! CLI `ask` command: run one chat turn in-process and print the event stream.

use anyhow::Result;
use std::io::Write;

use parley::chat::{ChatEvent, ChatRequest};
use parley::config::ParleyConfig;
use parley::thought::answer_text;

pub struct AskArgs {
    pub message: String,
    pub model: Option<String>,
    pub conversation: Option<String>,
    pub title: Option<String>,
    pub hide_thoughts: bool,
}

pub async fn ask(config: &ParleyConfig, args: AskArgs) -> Result<()> {
    let state = parley::server::build_state(config).await?;
    let request = ChatRequest {
        message: args.message,
        conversation_id: args.conversation,
        model: args
            .model
            .unwrap_or_else(|| config.inference.default_model.clone()),
        title: args.title,
    };

    let mut rx = state.chat.spawn_turn(request);
    let mut stdout = std::io::stdout();
    let mut raw = String::new();
    let mut outcome = Ok(());

    while let Some(event) = rx.recv().await {
        let terminal = event.is_terminal();
        match event {
            ChatEvent::Thinking { content } => {
                if !args.hide_thoughts {
                    eprintln!("{}", if content { "[thinking]" } else { "[answering]" });
                }
            }
            ChatEvent::Chunk { content } => {
                if args.hide_thoughts {
                    raw.push_str(&content);
                } else {
                    write!(stdout, "{content}")?;
                    stdout.flush()?;
                }
            }
            ChatEvent::Done { conversation_id } => {
                if args.hide_thoughts {
                    write!(stdout, "{}", answer_text(&raw).trim())?;
                }
                writeln!(stdout)?;
                eprintln!("conversation: {conversation_id}");
            }
            ChatEvent::Error { error } => {
                writeln!(stdout)?;
                outcome = Err(anyhow::anyhow!(error));
            }
        }
        if terminal {
            break;
        }
    }

    let store = state.store.clone();
    drop(state);
    store.close()?;
    outcome
}
