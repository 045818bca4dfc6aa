//! Inkwell Studio — a terminal front end for the session controller.
//!
//! Intentionally thin: every command maps straight onto a controller or
//! gateway operation. All interesting behaviour lives in the library
//! crates.

use anyhow::{Context, Result};
use base64::Engine;
use providers::{chat, image, GeminiClient};
use services::credentials::CredentialStore;
use services::export;
use services::knowledge::KnowledgeStore;
use shared::chat::Sender;
use shared::context::LocalContext;
use shared::credential::Credential;
use std::io::{self, BufRead, Write};
use std::path::Path;
use tracing_subscriber::EnvFilter;

mod session;
use session::{Mode, SendRefused, SessionController};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let credential_store = CredentialStore::new();
    let stored = credential_store.load();
    let mut controller = SessionController::new(credential_store, KnowledgeStore::new());

    // Resume a previous login if one is stored.
    if let Some(credential) = stored {
        let email = credential.email.clone();
        controller.complete_login(credential)?;
        println!("Welcome back, {email}.");
        print_transcript_tail(&controller);
    } else {
        println!("Inkwell Studio. Log in with: login <api-key> <email>");
    }

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "quit" || line == "exit" {
            break;
        }
        if let Err(e) = dispatch(&mut controller, line).await {
            println!("Error: {e:#}");
        }
    }
    Ok(())
}

async fn dispatch(controller: &mut SessionController, line: &str) -> Result<()> {
    let mut parts = line.splitn(2, ' ');
    let command = parts.next().unwrap_or_default();
    let rest = parts.next().unwrap_or("").trim();

    match command {
        "help" => print_help(),
        "login" => login(controller, rest).await?,
        "logout" => {
            controller.logout();
            println!("Logged out.");
        }
        "mode" => set_mode(controller, rest).await?,
        "kb" => kb_command(controller, rest).await?,
        "url" => url_command(controller, rest).await?,
        "attach" => attach(controller, rest).await?,
        "paste" => paste(controller).await?,
        "detach" => {
            controller.clear_local_context();
            println!("Context cleared.");
            refresh_suggestions(controller).await;
        }
        "search" => {
            let on = rest == "on";
            controller.set_web_search(on);
            println!("Web search {}.", if on { "on" } else { "off" });
        }
        "thinking" => {
            let on = rest != "off";
            controller.set_thinking(on);
            println!("Thinking {}.", if on { "on" } else { "off" });
        }
        "system" => {
            let prompt = (!rest.is_empty()).then(|| rest.to_string());
            controller.set_system_prompt(prompt);
            println!("System prompt updated.");
        }
        "image" => generate_image(controller, rest).await?,
        "edit" => edit_image(controller, rest).await?,
        "book" => generate_book(controller, rest).await?,
        "export" => export_book(controller)?,
        _ => send_chat(controller, line).await?,
    }
    Ok(())
}

fn print_help() {
    println!(
        "Commands:\n\
         \x20 login <api-key> <email>   verify the key and log in\n\
         \x20 logout                    forget the stored credential\n\
         \x20 mode chat|image|book      switch modes\n\
         \x20 kb list|new|use|rename|delete   manage knowledge bases\n\
         \x20 url add <url> | url rm <url>    edit the active knowledge base\n\
         \x20 attach <file> | paste | detach  manage the local context\n\
         \x20 search on|off             toggle web-search augmentation\n\
         \x20 thinking on|off           toggle model reasoning effort\n\
         \x20 system [prompt]           set or clear the system prompt\n\
         \x20 image <prompt>            generate an image\n\
         \x20 edit <file> <prompt>      edit an image\n\
         \x20 book <topic>              generate a book\n\
         \x20 export                    export the current book as HTML\n\
         \x20 anything else             chat with the active knowledge base"
    );
}

fn client_for(controller: &SessionController) -> Result<GeminiClient> {
    let credential = controller
        .credential()
        .context("not logged in — use: login <api-key> <email>")?;
    Ok(GeminiClient::new(&credential.api_key)?)
}

async fn login(controller: &mut SessionController, rest: &str) -> Result<()> {
    let mut parts = rest.split_whitespace();
    let (Some(key), Some(email)) = (parts.next(), parts.next()) else {
        println!("Usage: login <api-key> <email>");
        return Ok(());
    };

    // Probe the key before persisting anything.
    let client = GeminiClient::new(key)?;
    if let Err(e) = client.verify_key().await {
        println!("Login failed: {e}");
        return Ok(());
    }
    controller.complete_login(Credential::new(key, email))?;
    println!("Logged in as {email}.");
    print_transcript_tail(controller);
    refresh_suggestions(controller).await;
    Ok(())
}

async fn set_mode(controller: &mut SessionController, rest: &str) -> Result<()> {
    let mode = match rest {
        "chat" => Mode::Chat,
        "image" => Mode::Image,
        "book" => Mode::Book,
        _ => {
            println!("Usage: mode chat|image|book");
            return Ok(());
        }
    };
    controller.set_mode(mode);
    println!("Mode: {rest}.");
    if mode == Mode::Chat {
        print_transcript_tail(controller);
        refresh_suggestions(controller).await;
    }
    Ok(())
}

async fn kb_command(controller: &mut SessionController, rest: &str) -> Result<()> {
    let mut parts = rest.splitn(2, ' ');
    let sub = parts.next().unwrap_or_default();
    let arg = parts.next().unwrap_or("").trim();

    match sub {
        "list" | "" => {
            for (i, group) in controller.knowledge().groups().iter().enumerate() {
                let marker = if group.id == controller.knowledge().active_id() {
                    "*"
                } else {
                    " "
                };
                println!("{marker} {}. {} ({} URLs)", i + 1, group.name, group.urls.len());
            }
        }
        "new" => match controller.add_group(arg) {
            Ok(_) => {
                println!("Created and switched to \"{arg}\".");
                print_transcript_tail(controller);
            }
            Err(e) => println!("{e}"),
        },
        "use" => {
            let target = controller
                .knowledge()
                .groups()
                .iter()
                .find(|g| g.name == arg)
                .map(|g| g.id.clone());
            match target {
                Some(id) => {
                    controller.set_active_group(&id);
                    print_transcript_tail(controller);
                    refresh_suggestions(controller).await;
                }
                None => println!("No knowledge base named \"{arg}\"."),
            }
        }
        "rename" => {
            let id = controller.knowledge().active_id().to_string();
            match controller.rename_group(&id, arg) {
                Ok(()) => println!("Renamed."),
                Err(e) => println!("{e}"),
            }
        }
        "delete" => {
            let active = controller.knowledge().active();
            println!("Delete \"{}\"? (y/N)", active.name);
            let mut answer = String::new();
            io::stdin().lock().read_line(&mut answer)?;
            if answer.trim().eq_ignore_ascii_case("y") {
                let id = active.id.clone();
                match controller.remove_group(&id) {
                    Ok(()) => {
                        println!("Deleted.");
                        print_transcript_tail(controller);
                    }
                    Err(e) => println!("{e}"),
                }
            }
        }
        _ => println!("Usage: kb list|new <name>|use <name>|rename <name>|delete"),
    }
    Ok(())
}

async fn url_command(controller: &mut SessionController, rest: &str) -> Result<()> {
    let mut parts = rest.splitn(2, ' ');
    let sub = parts.next().unwrap_or_default();
    let url = parts.next().unwrap_or("").trim();

    match sub {
        "add" => match controller.add_url(url) {
            Ok(()) => {
                println!("Added.");
                refresh_suggestions(controller).await;
            }
            Err(e) => println!("{e}"),
        },
        "rm" => match controller.remove_url(url) {
            Ok(()) => {
                println!("Removed.");
                refresh_suggestions(controller).await;
            }
            Err(e) => println!("{e}"),
        },
        _ => {
            let urls = &controller.knowledge().active().urls;
            if urls.is_empty() {
                println!("No URLs in the active knowledge base.");
            }
            for url in urls {
                println!("  {url}");
            }
        }
    }
    Ok(())
}

async fn attach(controller: &mut SessionController, path: &str) -> Result<()> {
    if path.is_empty() {
        println!("Usage: attach <file>");
        return Ok(());
    }
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
    let name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string());
    controller.set_local_context(LocalContext { name, content });
    println!("Attached.");
    print_transcript_tail(controller);
    refresh_suggestions(controller).await;
    Ok(())
}

async fn paste(controller: &mut SessionController) -> Result<()> {
    println!("Paste text, end with a line containing only '.':");
    let mut content = String::new();
    let stdin = io::stdin();
    loop {
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 || line.trim() == "." {
            break;
        }
        content.push_str(&line);
    }
    controller.set_local_context(LocalContext {
        name: "Pasted text".to_string(),
        content,
    });
    println!("Attached.");
    refresh_suggestions(controller).await;
    Ok(())
}

async fn send_chat(controller: &mut SessionController, text: &str) -> Result<()> {
    let pending = match controller.begin_send(text) {
        Ok(pending) => pending,
        Err(SendRefused::NotLoggedIn) => {
            println!("Log in first: login <api-key> <email>");
            return Ok(());
        }
        Err(SendRefused::NotInChatMode) => {
            println!("Switch to chat mode first: mode chat");
            return Ok(());
        }
        Err(SendRefused::Busy) => {
            println!("Still working on the previous request.");
            return Ok(());
        }
    };

    let client = client_for(controller)?;
    let result = chat::send_chat(
        &client,
        &pending.prompt,
        &pending.urls,
        pending.local.as_ref(),
        &pending.options,
    )
    .await;
    controller.finish_send(pending, result);

    if let Some(last) = controller.transcript().last() {
        match last.sender {
            Sender::Model => println!("{}", last.text),
            Sender::System => println!("[{}]", last.text),
            Sender::User => {}
        }
        if let Some(retrieval) = &last.retrieval {
            for record in retrieval {
                println!("  [{}] {}", record.status, record.url);
            }
        }
    }
    Ok(())
}

/// Fire the suggestions fetch the controller wants, if any, and print
/// the result. Sequential here, but the epoch check still guards the
/// commit the same way it would in a concurrent front end.
async fn refresh_suggestions(controller: &mut SessionController) {
    let Some(pending) = controller.begin_suggestions() else {
        return;
    };
    let client = match client_for(controller) {
        Ok(client) => client,
        Err(_) => return,
    };
    let result = chat::initial_suggestions(
        &client,
        &pending.urls,
        pending.local_text.as_deref(),
    )
    .await;
    controller.finish_suggestions(pending, result);

    if !controller.suggestions().is_empty() {
        println!("Try asking:");
        for suggestion in controller.suggestions() {
            println!("  - {suggestion}");
        }
    }
}

async fn generate_image(controller: &mut SessionController, prompt: &str) -> Result<()> {
    if prompt.is_empty() {
        println!("Usage: image <prompt>");
        return Ok(());
    }
    let client = client_for(controller)?;
    println!("Generating...");
    match image::generate_image(&client, prompt).await {
        Ok(generated) => {
            let path = save_image(&generated.bytes, &generated.mime_type)?;
            println!("Saved {path}.");
        }
        Err(e) => println!("{e}"),
    }
    Ok(())
}

async fn edit_image(controller: &mut SessionController, rest: &str) -> Result<()> {
    let mut parts = rest.splitn(2, ' ');
    let (Some(path), Some(prompt)) = (parts.next(), parts.next()) else {
        println!("Usage: edit <file> <prompt>");
        return Ok(());
    };
    let bytes = std::fs::read(path).with_context(|| format!("reading {path}"))?;
    let mime = mime_for(path)?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);

    let client = client_for(controller)?;
    println!("Editing...");
    match image::edit_image(&client, prompt, &encoded, mime).await {
        Ok(generated) => {
            if !generated.caption.is_empty() {
                println!("{}", generated.caption);
            }
            let path = save_image(&generated.bytes, &generated.mime_type)?;
            println!("Saved {path}.");
        }
        Err(e) => println!("{e}"),
    }
    Ok(())
}

fn mime_for(path: &str) -> Result<&'static str> {
    let ext = Path::new(path)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Ok("image/png"),
        "jpg" | "jpeg" => Ok("image/jpeg"),
        "webp" => Ok("image/webp"),
        _ => anyhow::bail!("unsupported image type (use PNG, JPEG, or WEBP)"),
    }
}

fn save_image(bytes: &[u8], mime_type: &str) -> Result<String> {
    let ext = match mime_type {
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        _ => "png",
    };
    let name = format!("inkwell-{}.{ext}", chrono::Utc::now().format("%Y%m%d-%H%M%S"));
    std::fs::write(&name, bytes).with_context(|| format!("writing {name}"))?;
    Ok(name)
}

async fn generate_book(controller: &mut SessionController, topic: &str) -> Result<()> {
    if topic.is_empty() {
        println!("Usage: book <topic>");
        return Ok(());
    }
    let client = client_for(controller)?;
    println!("Generating outline and chapters (this takes a while)...");
    match providers::book::generate_book(&client, topic).await {
        Ok(book) => {
            println!("\"{}\" — {} chapters:", book.title, book.chapters.len());
            for chapter in &book.chapters {
                println!("  - {}", chapter.title);
            }
            controller.set_book(book);
            println!("Use 'export' to save it as HTML.");
        }
        Err(e) => println!("{e}"),
    }
    Ok(())
}

fn export_book(controller: &SessionController) -> Result<()> {
    let Some(book) = controller.book() else {
        println!("No book yet — generate one with: book <topic>");
        return Ok(());
    };
    let path = export::write_export(book, Path::new("."))?;
    println!("Exported {}.", path.display());
    Ok(())
}

fn print_transcript_tail(controller: &SessionController) {
    if let Some(msg) = controller.transcript().last() {
        println!("{}", msg.text);
    }
}
