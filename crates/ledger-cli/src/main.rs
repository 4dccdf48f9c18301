use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use reqwest::{Client, Response};
use serde::Serialize;
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "ledger-cli")]
#[command(about = "CLI client for the proof-of-work ledger node")]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Args, Debug)]
struct Node {
    /// Node base URL (e.g. http://127.0.0.1:5000)
    #[arg(long, default_value = "http://127.0.0.1:5000")]
    node: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Submit a transaction to the pending pool
    Submit {
        #[command(flatten)]
        node: Node,
        /// Sender
        #[arg(long)]
        sender: String,
        /// Recipient
        #[arg(long)]
        recipient: String,
        /// Amount
        #[arg(long)]
        amount: u64,
    },
    /// Mine one block on the node
    Mine {
        #[command(flatten)]
        node: Node,
    },
    /// Print the node's full chain
    Chain {
        #[command(flatten)]
        node: Node,
    },
    /// Register peer addresses with the node
    Register {
        #[command(flatten)]
        node: Node,
        /// Peer URLs (e.g. http://127.0.0.1:5001)
        #[arg(required = true)]
        peers: Vec<String>,
    },
    /// Run conflict resolution against registered peers
    Resolve {
        #[command(flatten)]
        node: Node,
    },
}

#[derive(Serialize)]
struct Tx {
    sender: String,
    recipient: String,
    amount: u64,
}

#[derive(Serialize)]
struct Register {
    nodes: Vec<String>,
}

async fn print_response(res: Response) -> Result<()> {
    let status = res.status();
    let body = res.text().await?;
    println!("status: {}", status);
    match serde_json::from_str::<serde_json::Value>(&body) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{body}"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .pretty()
        .init();

    let cli = Cli::parse();
    let client = Client::new();
    let res = match cli.cmd {
        Command::Submit {
            node,
            sender,
            recipient,
            amount,
        } => {
            let tx = Tx {
                sender,
                recipient,
                amount,
            };
            client
                .post(format!("{}/transactions/new", node.node))
                .json(&tx)
                .send()
                .await?
        }
        Command::Mine { node } => client.get(format!("{}/mine", node.node)).send().await?,
        Command::Chain { node } => client.get(format!("{}/chain", node.node)).send().await?,
        Command::Register { node, peers } => {
            client
                .post(format!("{}/nodes/register", node.node))
                .json(&Register { nodes: peers })
                .send()
                .await?
        }
        Command::Resolve { node } => {
            client
                .get(format!("{}/nodes/resolve", node.node))
                .send()
                .await?
        }
    };
    debug!(url = %res.url(), "request complete");
    print_response(res).await
}
