//! `toolweave chat`: interactive or single-message chat mode.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use toolweave_agent::AgentSession;
use toolweave_core::event::{DomainEvent, EventBus};

use super::Runtime;

pub async fn run(config_path: Option<&Path>, message: Option<String>, steps: bool) -> anyhow::Result<()> {
    let runtime = Runtime::start(config_path).await?;
    let event_bus = Arc::new(EventBus::default());
    let mut session = AgentSession::new(
        Arc::clone(&runtime.provider),
        Arc::clone(&runtime.dispatcher),
        &runtime.config,
    )
    .with_event_bus(Arc::clone(&event_bus));

    let progress = steps.then(|| tokio::spawn(print_steps(Arc::clone(&event_bus))));

    let result = match message {
        Some(msg) => single(&mut session, &msg).await,
        None => interactive(&mut session, &runtime).await,
    };

    if let Some(task) = progress {
        task.abort();
    }
    runtime.shutdown().await;
    result
}

async fn single(session: &mut AgentSession, message: &str) -> anyhow::Result<()> {
    eprint!("  Thinking...");
    let reply = session.process_message(message, None).await;
    eprint!("\r              \r");
    println!("{}", reply?.text);
    Ok(())
}

async fn interactive(session: &mut AgentSession, runtime: &Runtime) -> anyhow::Result<()> {
    println!();
    println!("  toolweave chat");
    println!();
    println!("  Model:     {}", runtime.config.model.name);
    println!("  Endpoint:  {}", runtime.config.model.base_url);
    println!(
        "  Tools:     {} from {} provider(s)",
        runtime.dispatcher.tool_names().len(),
        runtime.dispatcher.services().len()
    );
    println!();
    println!("  Type your message and press Enter.");
    println!("  '/reset' clears the conversation, '/stats' shows usage, 'exit' quits.");
    println!();
    if let Some(welcome) = session.welcome() {
        println!("  Assistant > {welcome}");
        println!();
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        match input {
            "" => continue,
            "exit" | "quit" => break,
            "/reset" => {
                session.reset();
                println!("  Conversation cleared.");
                continue;
            }
            "/stats" => {
                println!("{}", serde_json::to_string_pretty(&session.stats())?);
                continue;
            }
            _ => {}
        }

        eprint!("  ...");
        match session.process_message(input, None).await {
            Ok(reply) => {
                eprint!("\r     \r");
                println!();
                for line in reply.text.lines() {
                    println!("  Assistant > {line}");
                }
                println!();
            }
            Err(e) => {
                eprint!("\r     \r");
                eprintln!("  [Error] {e}");
                println!();
            }
        }
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

async fn print_steps(event_bus: Arc<EventBus>) {
    let mut events = event_bus.subscribe();
    while let Ok(event) = events.recv().await {
        match event.as_ref() {
            DomainEvent::RoundStarted { round, .. } => eprintln!("  [round {round}]"),
            DomainEvent::ToolExecuted {
                tool_name,
                service,
                success,
                duration_ms,
                ..
            } => {
                let mark = if *success { "ok" } else { "failed" };
                eprintln!("    [{service}] {tool_name} {mark} ({duration_ms} ms)");
            }
            DomainEvent::ErrorOccurred { context, error_message, .. } => {
                eprintln!("    error in {context}: {error_message}");
            }
            DomainEvent::ResponseGenerated { .. } => {}
        }
    }
}
