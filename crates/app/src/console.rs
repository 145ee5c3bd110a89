//! Interactive console loop over a [`Connection`]

use lobby_core::ConnectionState;
use lobby_net::{Connection, Error};
use tokio::io::{AsyncWriteExt, BufReader, Lines, Stdin};
use tracing::{debug, info};

use crate::commands::{parse_command, ConsoleCommand, PROMPT};

type Input = Lines<BufReader<Stdin>>;

/// Prompt for a nickname until registration succeeds
pub async fn register(conn: &Connection, input: &mut Input) -> std::io::Result<bool> {
    loop {
        prompt("Enter nickname: ").await?;
        let Some(nickname) = input.next_line().await? else {
            return Ok(false);
        };

        match conn.register(nickname.trim()).await {
            Ok(id) => {
                println!("Registered with id {}", id);
                return Ok(true);
            }
            Err(Error::ConnectionLost) => {
                println!("Connection lost");
                return Ok(false);
            }
            Err(e) => {
                println!("{}", e);
                if is_disconnected(conn).await {
                    return Ok(false);
                }
            }
        }
    }
}

/// Read and run commands until exit, end of input or a lost connection
pub async fn run(conn: &Connection, input: &mut Input) -> std::io::Result<()> {
    loop {
        prompt(PROMPT).await?;
        let Some(line) = input.next_line().await? else {
            break;
        };

        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };

        if command == ConsoleCommand::Exit {
            break;
        }

        debug!(command = ?command, "Running command");
        match execute(conn, command).await {
            Ok(()) => {}
            Err(Error::ConnectionLost) => {
                println!("Connection lost");
                break;
            }
            Err(e) => {
                println!("{}", e);
                if is_disconnected(conn).await {
                    break;
                }
            }
        }
    }

    info!("Console loop finished");
    Ok(())
}

/// A transport failure leaves the connection unusable
async fn is_disconnected(conn: &Connection) -> bool {
    let lost = conn.state().await == ConnectionState::NotConnected;
    if lost {
        println!("Connection lost");
    }
    lost
}

async fn execute(conn: &Connection, command: ConsoleCommand) -> lobby_net::Result<()> {
    match command {
        ConsoleCommand::Exit => {}
        ConsoleCommand::State => println!("{}", conn.state().await),
        ConsoleCommand::List => {
            let players = conn.players().await?;
            println!("players:");
            for player in players {
                println!("{}:{}", player.id, player.nickname);
            }
        }
        ConsoleCommand::Offer(target) => conn.send_offer(&target).await?,
        ConsoleCommand::Message(body) => conn.send_message(&body).await?,
        ConsoleCommand::Messages => {
            for message in conn.messages().await? {
                println!(
                    "[{}] #{} {}: {}",
                    message.format_timestamp(),
                    message.id,
                    message.sender_id,
                    message.body
                );
            }
        }
        ConsoleCommand::RemoveMessage(id) => conn.remove_message(id).await?,
        ConsoleCommand::EndGame => conn.end_game().await?,
        ConsoleCommand::Offers => {
            for offer in conn.offers().await? {
                println!("offer from {}", offer);
            }
        }
    }
    Ok(())
}

async fn prompt(text: &str) -> std::io::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(text.as_bytes()).await?;
    stdout.flush().await
}
