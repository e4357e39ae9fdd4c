use clap::Parser;
use client::console::{format_push, format_response, parse_line};
use client::network::Client;
use log::info;
use shared::{Command, Push};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8888")]
    server: String,

    /// How long to wait for a response, in milliseconds
    #[arg(long, default_value = "10000")]
    timeout_ms: u64,

    /// Connection attempts before giving up
    #[arg(short = 'r', long, default_value = "5")]
    retries: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Connecting to: {}", args.server);
    let mut client = Client::connect_with_retry(&args.server, args.retries, Duration::from_secs(1))
        .await?
        .with_timeout(Duration::from_millis(args.timeout_ms));

    println!("Commands: join <name> | start | stop City=Paris; Fruit=Pear | quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let command = match parse_line(&line) {
                    Ok(command) => command,
                    Err(message) => {
                        println!("{}", message);
                        continue;
                    }
                };

                let quitting = command == Command::Quit;
                let response = client.send(&command).await?;
                println!("{}", format_response(&response));
                if quitting {
                    break;
                }
            }
            push = client.recv_push() => {
                match push {
                    Some(push) => {
                        println!("{}", format_push(&push));
                        if push == Push::Shutdown {
                            break;
                        }
                    }
                    None => {
                        println!("Disconnected from server");
                        break;
                    }
                }
            }
        }
    }

    Ok(())
}
