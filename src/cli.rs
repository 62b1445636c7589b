//! Command-line surface of the `lime-client` sample driver (component J):
//! connect, send a message, ping, or close a session.

use std::path::PathBuf;

use structopt::StructOpt;

use crate::node::Node;

#[derive(Debug, StructOpt)]
#[structopt(name = "lime-client")]
#[non_exhaustive]
pub struct Cli {
    /// Path to a `Lime.toml` configuration file; defaults to the platform
    /// configuration directory.
    #[structopt(long)]
    pub config: Option<PathBuf>,
    #[structopt(subcommand)]
    pub command: Command,
}

#[derive(Debug, StructOpt)]
pub enum Command {
    /// Connect, negotiate, authenticate, and report the established session id.
    Connect(Connect),
    /// Connect, establish a session, send a single message, then close.
    SendMessage(SendMessage),
    /// Connect, establish a session, send a ping command, then close.
    Ping(Ping),
    /// Connect, establish a session, and immediately finish it.
    Close(Close),
}

#[derive(Debug, StructOpt)]
#[non_exhaustive]
pub struct Connect {
    /// This client's own node address, e.g. `alice@example.com`.
    #[structopt(long)]
    pub identity: Node,
    /// Authenticate as a guest, without a password.
    #[structopt(long)]
    pub guest: bool,
    /// Plain-scheme password; ignored if `--guest` is given.
    #[structopt(long)]
    pub password: Option<String>,
}

#[derive(Debug, StructOpt)]
#[non_exhaustive]
pub struct SendMessage {
    #[structopt(flatten)]
    pub connect: Connect,
    /// The recipient node address.
    pub to: Node,
    /// The message content, sent as `text/plain`.
    pub content: String,
}

#[derive(Debug, StructOpt)]
#[non_exhaustive]
pub struct Ping {
    #[structopt(flatten)]
    pub connect: Connect,
    /// The node address to ping.
    pub to: Node,
}

#[derive(Debug, StructOpt)]
#[non_exhaustive]
pub struct Close {
    #[structopt(flatten)]
    pub connect: Connect,
}
