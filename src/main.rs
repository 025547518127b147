use anyhow::Result;
use std::io::{self, BufRead, Write};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use bookbot::{ApiClient, PageContext, SessionStore, WidgetConfig, WidgetController};

/// Terminal driver for the widget controller: stands in for the host page,
/// feeding queries and showing answers.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = WidgetConfig::load()?;
    let client = ApiClient::from_config(&config);
    let store = SessionStore::open(SessionStore::default_path())?;
    let page = PageContext {
        url: std::env::var("BOOKBOT_PAGE_URL")
            .unwrap_or_else(|_| "http://localhost:3000/docs".to_string()),
        title: std::env::var("BOOKBOT_PAGE_TITLE").unwrap_or_else(|_| "Documentation".to_string()),
    };

    let mut widget = WidgetController::new(config, client, store, page)?;
    widget.start_connection_monitoring(Duration::from_secs(30));
    widget.toggle();

    println!("bookbot: ask a question about the page.");
    println!("commands: :toggle  :health  :clear  :quit");

    let stdin = io::stdin();
    loop {
        print!("> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        match line.trim() {
            "" => continue,
            ":quit" | ":q" => break,
            ":toggle" => {
                widget.toggle();
                println!("widget state: {:?}", widget.state());
            }
            ":health" => {
                println!("backend healthy: {}", widget.check_health().await);
            }
            ":clear" => {
                widget.clear_selection();
                println!("selection cleared");
            }
            query => match widget.submit(query).await {
                Ok(()) => {
                    if let Some(message) = widget.session().last_message() {
                        println!("{}", message.content);
                        if widget.config().show_sources && !message.sources.is_empty() {
                            println!("sources: {}", message.sources.join(", "));
                        }
                    }
                }
                Err(e) => eprintln!("{}", e),
            },
        }
    }

    widget.stop_connection_monitoring();
    Ok(())
}
