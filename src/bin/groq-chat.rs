//! Interactive chat application for Groq-hosted models.
//!
//! This binary provides a streaming REPL interface over the Groq
//! chat-completions API.
//!
//! # Usage
//!
//! ```bash
//! # Basic usage; the API key comes from GROQ_API_KEY
//! groq-chat
//!
//! # Specify a model and sampling settings
//! groq-chat --model llama-3.1-8b-instant --temperature 0.4 --max-tokens 2048
//!
//! # Record every request and streamed chunk
//! groq-chat --log-file chat.jsonl
//!
//! # Disable colors (useful for piping output)
//! groq-chat --no-color
//! ```
//!
//! # Commands
//!
//! While chatting, you can use slash commands:
//! - `/help` - Show available commands
//! - `/clear` - Clear conversation history
//! - `/model <name>` - Change the model
//! - `/models` - List known models
//! - `/temperature <v>` - Set the temperature
//! - `/max_tokens <n>` - Set the response length limit
//! - `/key <api-key>` - Set the API key
//! - `/stats` - Show session statistics
//! - `/quit` - Exit the application

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use arrrg::CommandLine;
use biometrics::Collector;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use groqchat::chat::{
    ChatArgs, ChatCommand, ChatConfig, ChatSession, ConfigUpdate, PlainTextRenderer, Renderer,
    clamp_max_tokens, clamp_temperature, help_text, parse_command,
};
use groqchat::{
    API_KEY_ENV, CompletionBackend, Credential, Groq, JsonLinesLogger, KnownModel, Model,
    register_biometrics,
};

/// Shown after any failure reported by the remote service.
const FAILURE_HINT: &str = "Make sure your API key is valid and you have internet connection.";

/// Main entry point for the groq-chat application.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let (args, _) = ChatArgs::from_command_line_relaxed("groq-chat [OPTIONS]");
    let config = ChatConfig::try_from(args)?.with_credential_from_env();
    let use_color = config.use_color;

    register_biometrics(Collector::new());

    let mut client = Groq::with_options(config.base_url.clone(), None)?;
    if let Some(path) = &config.log_file {
        client = client.with_logger(Arc::new(JsonLinesLogger::open(path)?));
    }
    let mut session = ChatSession::new(client, config.session);

    // Flag for interrupt handling during streaming
    let interrupted = Arc::new(AtomicBool::new(false));
    let mut renderer = PlainTextRenderer::with_color(use_color).with_interrupt(interrupted.clone());
    let mut rl = DefaultEditor::new()?;

    // Set up Ctrl+C handler
    let interrupted_clone = interrupted.clone();
    ctrlc::set_handler(move || {
        interrupted_clone.store(true, Ordering::Relaxed);
    })?;

    println!("Groq Chat (model: {})", session.configuration().model);
    println!("Type /help for commands, /quit to exit\n");
    if !session.configuration().has_credential() {
        renderer.print_info(&missing_key_message());
    }

    loop {
        // Reset interrupt flag before each input
        interrupted.store(false, Ordering::Relaxed);

        let readline = rl.readline("You: ");

        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                if let Some(cmd) = parse_command(line) {
                    // Keep API keys out of the history.
                    if !matches!(cmd, ChatCommand::Key(_)) {
                        let _ = rl.add_history_entry(line);
                    }
                    if !handle_command(cmd, &mut session, &mut renderer) {
                        println!("Goodbye!");
                        break;
                    }
                    continue;
                }

                let _ = rl.add_history_entry(line);
                if !session.configuration().has_credential() {
                    renderer.print_error(&missing_key_message());
                    continue;
                }

                println!("Assistant:");
                match session.append_user_turn(line, &mut renderer).await {
                    Ok(()) => {}
                    // The renderer has already reported these.
                    Err(err) if err.is_abort() => {}
                    Err(err) if err.is_remote() => renderer.print_info(FAILURE_HINT),
                    Err(err) if err.is_missing_credential() => {
                        renderer.print_error(&missing_key_message())
                    }
                    Err(err) => renderer.print_error(&err.to_string()),
                }
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl+C at prompt - soft interrupt
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                // Ctrl+D - exit
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                renderer.print_error(&format!("Input error: {err}"));
                break;
            }
        }
    }

    Ok(())
}

/// Applies one slash command. Returns false when the user asked to quit.
fn handle_command<B: CompletionBackend>(
    cmd: ChatCommand,
    session: &mut ChatSession<B>,
    renderer: &mut PlainTextRenderer,
) -> bool {
    match cmd {
        ChatCommand::Quit => return false,
        ChatCommand::Clear => {
            session.clear();
            renderer.print_info("Conversation cleared.");
        }
        ChatCommand::Help => {
            for line in help_text().lines() {
                println!("    {line}");
            }
        }
        ChatCommand::Model(model_name) => {
            session.update_configuration(ConfigUpdate::model(Model::from(model_name.as_str())));
            renderer.print_info(&format!("Model changed to: {model_name}"));
        }
        ChatCommand::ListModels => {
            let current = &session.configuration().model;
            println!("    Known models:");
            for known in KnownModel::ALL {
                let marker = if *current == Model::Known(known) { "*" } else { " " };
                println!("    {marker} {known}");
            }
        }
        ChatCommand::Temperature(value) => {
            let clamped = clamp_temperature(value);
            session.update_configuration(ConfigUpdate::temperature(clamped));
            if clamped != value {
                renderer.print_info(&format!(
                    "temperature {value} is out of range; set to {clamped:.2}"
                ));
            } else {
                renderer.print_info(&format!("temperature set to {clamped:.2}"));
            }
        }
        ChatCommand::MaxTokens(value) => {
            let clamped = clamp_max_tokens(value);
            session.update_configuration(ConfigUpdate::max_tokens(clamped));
            if clamped != value {
                renderer.print_info(&format!(
                    "max_tokens {value} is out of range; set to {clamped}"
                ));
            } else {
                renderer.print_info(&format!("max_tokens set to {clamped}"));
            }
        }
        ChatCommand::Key(key) => {
            session.update_configuration(ConfigUpdate::credential(Credential::new(key)));
            renderer.print_info("API key updated.");
        }
        ChatCommand::Stats => print_stats(session),
        ChatCommand::ShowConfig => print_config(session),
        ChatCommand::Invalid(message) => renderer.print_error(&message),
    }
    true
}

fn missing_key_message() -> String {
    format!("No API key configured. Set {API_KEY_ENV} or use /key <api-key>.")
}

fn print_stats<B: CompletionBackend>(session: &ChatSession<B>) {
    let stats = session.stats();
    println!("    Session Statistics:");
    println!("      Model: {}", stats.model);
    println!("      Messages: {}", stats.message_count);
    println!(
        "      Requests: {} ({} completed, {} failed)",
        stats.requests, stats.completed, stats.failed
    );
}

fn print_config<B: CompletionBackend>(session: &ChatSession<B>) {
    let stats = session.stats();
    println!("    Current Configuration:");
    println!("      Model: {}", stats.model);
    println!("      Temperature: {:.2}", stats.temperature);
    println!("      Max tokens: {}", stats.max_tokens);
    println!(
        "      API key: {}",
        if stats.has_credential { "set" } else { "(not set)" }
    );
}
