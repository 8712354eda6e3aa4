//! minikv CLI Client
//!
//! Sends a single command to a running server and prints the reply.

use clap::Parser;
use minikv::{Client, ClientError, CommandHandler, Value, DEFAULT_HOST, DEFAULT_PORT};

/// minikv CLI
#[derive(Parser, Debug)]
#[command(name = "minikv-cli")]
#[command(about = "CLI for the minikv key-value store")]
#[command(version)]
#[command(after_help = commands_help())]
struct Args {
    /// Server host
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    /// Server port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Command name followed by its arguments
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

fn commands_help() -> String {
    let names: Vec<&str> = CommandHandler::command_names().collect();
    format!("Commands: {}", names.join(", "))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut client = Client::connect((args.host.as_str(), args.port)).await?;
    let request = args.command.into_iter().map(Value::bulk_string).collect();

    match client.execute(request).await {
        Ok(reply) => println!("{}", reply),
        Err(ClientError::Command(message)) => println!("(error) {}", message),
        Err(e) => return Err(e.into()),
    }

    Ok(())
}
