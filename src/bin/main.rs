use std::sync::Arc;

use anyhow::Context;
use structopt::StructOpt;

use lime::cli::{Cli, Close, Command, Connect, Ping, SendMessage};
use lime::client::Credentials;
use lime::envelope::{CommandMethod, Message};
use lime::timeout::WithTimeout;
use lime::trace::TracingTraceWriter;
use lime::{defaults, ClientSession, Config};

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    main_with_cli(Cli::from_args()).await
}

async fn main_with_cli(cli: Cli) -> Result<(), anyhow::Error> {
    let config_path = match cli.config {
        Some(path) => path,
        None => defaults::config_path()?,
    };
    let config = Config::load(&config_path)
        .await
        .with_context(|| format!("could not load configuration from {:?}", config_path))?;

    match cli.command {
        Command::Connect(connect) => run_connect(config, connect).await,
        Command::SendMessage(send) => run_send_message(config, send).await,
        Command::Ping(ping) => run_ping(config, ping).await,
        Command::Close(close) => run_close(config, close).await,
    }
}

fn credentials(connect: &Connect) -> Credentials {
    if connect.guest {
        Credentials::Guest
    } else if let Some(password) = &connect.password {
        Credentials::Plain {
            password: password.clone(),
        }
    } else {
        Credentials::Guest
    }
}

async fn establish(config: &Config, connect: &Connect) -> Result<ClientSession, anyhow::Error> {
    let session = ClientSession::new(Arc::new(TracingTraceWriter));
    session
        .establish_session(
            &config.uri(),
            &connect.identity,
            credentials(connect),
            config.handshake_timeout,
        )
        .await
        .context("failed to establish session")?;
    Ok(session)
}

async fn run_connect(config: Config, connect: Connect) -> Result<(), anyhow::Error> {
    let session = establish(&config, &connect).await?;
    println!("session established: {:?}", session.channel().session_id());
    session.finish_session(config.handshake_timeout).await?;
    Ok(())
}

async fn run_send_message(config: Config, args: SendMessage) -> Result<(), anyhow::Error> {
    let session = establish(&config, &args.connect).await?;

    let mut message = Message::new(serde_json::Value::String(args.content));
    message.r#type = Some("text/plain".to_string());
    message.shared.to = Some(args.to);
    session
        .channel()
        .send_message(message)
        .await
        .context("failed to send message")?;

    session.finish_session(config.handshake_timeout).await?;
    Ok(())
}

async fn run_ping(config: Config, args: Ping) -> Result<(), anyhow::Error> {
    let session = establish(&config, &args.connect).await?;

    let mut command = lime::envelope::Command::new(uuid::Uuid::new_v4().to_string(), CommandMethod::Get);
    command.uri = Some("/ping".to_string());
    command.shared.to = Some(args.to);

    let (tx, rx) = tokio::sync::oneshot::channel();
    let handle = session.channel().add_command_listener(
        Arc::new(move |response| {
            let _ = tx.send(response);
        }),
        true,
    );
    session
        .channel()
        .send_command(command)
        .await
        .context("failed to send ping")?;

    match rx.with_timeout(config.handshake_timeout).await {
        Ok(Ok(response)) => println!("pong: {:?}", response.status),
        _ => {
            session.channel().remove_command_listener(handle);
            println!("ping timed out");
        }
    }

    session.finish_session(config.handshake_timeout).await?;
    Ok(())
}

async fn run_close(config: Config, close: Close) -> Result<(), anyhow::Error> {
    let session = establish(&config, &close.connect).await?;
    session.finish_session(config.handshake_timeout).await?;
    Ok(())
}
