//! Long-running mode: drives the event host from stdin.
//!
//! Each line is one command:
//!
//! - `get <url-or-path>` serve a GET through the active generation; requests
//!   it declines go to the network unmodified, as with `shellcache get`
//! - `message <signal>` deliver a control message
//! - `deploy` install and activate the configured manifest
//! - `release` the active generation's clients went away
//! - `status` print generation status
//! - `quit` stop

use anyhow::Result;
use shellcache_core::{Host, HostHandle, Request, Signal};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use crate::commands::{print_status, Session};
use crate::format::describe_response;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServeCommand {
    Get(String),
    Message(String),
    Deploy,
    Release,
    Status,
    Quit,
}

/// Parse one input line. Blank lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<ServeCommand>, String> {
    let mut parts = line.split_whitespace();
    let Some(verb) = parts.next() else {
        return Ok(None);
    };
    let arg = parts.next();
    if parts.next().is_some() {
        return Err(format!("too many arguments for {}", verb));
    }

    let command = match (verb, arg) {
        ("get", Some(target)) => ServeCommand::Get(target.to_string()),
        ("message", Some(signal)) => ServeCommand::Message(signal.to_string()),
        ("deploy", None) => ServeCommand::Deploy,
        ("release", None) => ServeCommand::Release,
        ("status", None) => ServeCommand::Status,
        ("quit" | "exit", None) => ServeCommand::Quit,
        ("get" | "message", None) => return Err(format!("{} needs an argument", verb)),
        (_, Some(_)) if matches!(verb, "deploy" | "release" | "status" | "quit" | "exit") => {
            return Err(format!("{} takes no argument", verb))
        }
        _ => return Err(format!("unknown command: {}", verb)),
    };
    Ok(Some(command))
}

pub async fn run(session: Session) -> Result<()> {
    let (mut registry, resumed) = session.resumed_registry().await?;
    if !resumed {
        info!("No generation to resume, deploying configured manifest");
        registry.deploy(session.config.bundle()?).await?;
    }

    let (handle, task) = Host::spawn(registry);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let command = match parse_line(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("error: {}", e);
                continue;
            }
        };
        if command == ServeCommand::Quit {
            break;
        }
        if let Err(e) = execute(&session, &handle, command).await {
            println!("error: {:#}", e);
        }
    }

    drop(handle);
    task.await?;
    info!("Serve loop finished");
    Ok(())
}

async fn execute(session: &Session, handle: &HostHandle, command: ServeCommand) -> Result<()> {
    match command {
        ServeCommand::Get(target) => {
            let url = session.origin.resolve(&target)?;
            match handle.fetch(Request::get(url.clone())).await? {
                Some(response) => println!("{}", describe_response(&response)),
                None => {
                    let response = session.pass_through(&url).await?;
                    println!("{} (network)", describe_response(&response));
                }
            }
        }
        ServeCommand::Message(signal) => match signal.parse::<Signal>() {
            Ok(signal) => {
                handle.message(signal).await?;
                println!("ok");
            }
            Err(e) => {
                debug!(error = %e, "Ignoring message");
                println!("ignored");
            }
        },
        ServeCommand::Deploy => {
            let id = handle.deploy(session.config.bundle()?).await?;
            println!("deployed generation {}", id);
        }
        ServeCommand::Release => {
            handle.clients_released().await?;
            println!("ok");
        }
        ServeCommand::Status => print_status(&handle.status().await?),
        // Handled by the read loop
        ServeCommand::Quit => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tempfile::TempDir;

    /// Session for an origin nothing listens on
    fn closed_port_session(temp: &TempDir) -> Session {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        Session::new(Config {
            origin: Some(format!("http://127.0.0.1:{}", port)),
            cache_dir: Some(temp.path().join("cache")),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_parse_line() {
        assert_eq!(parse_line("   "), Ok(None));
        assert_eq!(
            parse_line("get /main.js"),
            Ok(Some(ServeCommand::Get("/main.js".into())))
        );
        assert_eq!(
            parse_line("message skip-wait"),
            Ok(Some(ServeCommand::Message("skip-wait".into())))
        );
        assert_eq!(parse_line(" deploy "), Ok(Some(ServeCommand::Deploy)));
        assert_eq!(parse_line("release"), Ok(Some(ServeCommand::Release)));
        assert_eq!(parse_line("exit"), Ok(Some(ServeCommand::Quit)));
    }

    #[tokio::test]
    async fn test_declined_get_goes_to_network() {
        let temp = TempDir::new().unwrap();
        let session = closed_port_session(&temp);
        let (handle, task) = Host::spawn(session.registry());

        // Nothing is active, so the host declines and the direct fetch fails
        let err = execute(&session, &handle, ServeCommand::Get("/main.js".into()))
            .await
            .unwrap_err();

        assert!(format!("{:#}", err).contains("Failed to fetch"));
        drop(handle);
        task.await.unwrap();
    }

    #[test]
    fn test_parse_line_errors() {
        assert!(parse_line("get").unwrap_err().contains("needs an argument"));
        assert!(parse_line("status now").unwrap_err().contains("takes no argument"));
        assert!(parse_line("get a b").unwrap_err().contains("too many"));
        assert!(parse_line("fly").unwrap_err().contains("unknown command"));
    }
}
