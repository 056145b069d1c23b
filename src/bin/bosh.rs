//! XMPP-over-BOSH CLI binary.
//!
//! # Commands
//!
//! - `connect` - Authenticate a new session and print its `{jid, sid, rid, url, lang}`
//! - `attach` - Resume an exported session, send stanzas, print inbound traffic

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use xmpp_bosh::{
    BoshClient, BoshConfig, Credentials, Handshake, HttpTransport, SessionEvent, SessionInfo,
    VERSION,
};

#[derive(Parser)]
#[command(name = "bosh")]
#[command(version = VERSION)]
#[command(about = "XMPP over BOSH - connect, export and attach sessions", long_about = None)]
struct Cli {
    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Authenticate and print the session for later attach
    Connect {
        /// BOSH endpoint URL
        #[arg(long)]
        url: Option<String>,

        /// XMPP domain
        #[arg(long)]
        domain: Option<String>,

        /// Resource to bind (server-assigned when absent)
        #[arg(short, long)]
        resource: Option<String>,

        /// Account node; omit for anonymous login
        #[arg(short, long)]
        node: Option<String>,

        /// Account password (or BOSH_PASSWORD)
        #[arg(long)]
        password: Option<String>,

        /// TOML config file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Skip TLS certificate verification
        #[arg(long)]
        insecure: bool,

        /// Keep the session open and print inbound stanzas until Ctrl-C
        #[arg(short, long)]
        listen: bool,

        /// Write the session JSON to a file instead of stdout
        #[arg(short, long)]
        save: Option<PathBuf>,
    },

    /// Resume an exported session
    Attach {
        /// Session JSON written by `connect --save`
        #[arg(short, long)]
        session: PathBuf,

        /// Stanza to send after attaching (repeatable)
        #[arg(long = "send")]
        stanzas: Vec<String>,

        /// Skip TLS certificate verification
        #[arg(long)]
        insecure: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let runtime = tokio::runtime::Runtime::new()?;

    match cli.command {
        Commands::Connect {
            url,
            domain,
            resource,
            node,
            password,
            config,
            insecure,
            listen,
            save,
        } => {
            let mut config = load_config(config, url, domain)?;
            if let Some(resource) = resource {
                config = config.with_resource(&resource);
            }
            if insecure {
                config = config.insecure();
            }

            let password = password.or_else(|| std::env::var("BOSH_PASSWORD").ok());
            let credentials = Credentials::from_parts(node.as_deref(), password.as_deref())?;

            runtime.block_on(run_connect(config, credentials, listen, save))
        },

        Commands::Attach {
            session,
            stanzas,
            insecure,
        } => runtime.block_on(run_attach(session, stanzas, insecure)),
    }
}

async fn run_connect(
    config: BoshConfig,
    credentials: Option<Credentials>,
    listen: bool,
    save: Option<PathBuf>,
) -> anyhow::Result<()> {
    let transport = HttpTransport::new(&config)?;
    let mut handshake = Handshake::new(config, credentials);

    if !listen {
        // Hand the session over untouched: no listen frame, so the exported
        // rid is the next one the server expects.
        let session = handshake.run(&transport).await?;
        return write_output(save, &session.info().to_json()?);
    }

    let (events, rx) = mpsc::unbounded_channel();
    let client = BoshClient::connect_with(handshake, transport, events).await?;
    write_output(save, &client.session_info().await.to_json()?)?;

    print_until_interrupted(&client, rx).await
}

async fn run_attach(session: PathBuf, stanzas: Vec<String>, insecure: bool) -> anyhow::Result<()> {
    let info = SessionInfo::from_json(&std::fs::read_to_string(&session)?)?;

    let mut config = BoshConfig::new(&info.url, xmpp_bosh::protocol::jid::domain(&info.jid));
    if insecure {
        config = config.insecure();
    }
    let transport = HttpTransport::new(&config)?;

    let (events, rx) = mpsc::unbounded_channel();
    let client = BoshClient::attach(&info, transport, events).await?;
    for stanza in &stanzas {
        client.send_xml(stanza).await?;
    }

    print_until_interrupted(&client, rx).await
}

async fn print_until_interrupted(
    client: &BoshClient<HttpTransport, mpsc::UnboundedSender<SessionEvent>>,
    mut rx: mpsc::UnboundedReceiver<SessionEvent>,
) -> anyhow::Result<()> {
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!("Disconnecting...");
                if let Err(e) = client.disconnect().await {
                    eprintln!("Disconnect failed: {e}");
                }
                return Ok(());
            },
            event = rx.recv() => match event {
                Some(SessionEvent::Message(stanza) | SessionEvent::Iq(stanza) | SessionEvent::Presence(stanza)) => {
                    println!("{}", String::from(&stanza));
                },
                Some(SessionEvent::Error(error)) => eprintln!("Error: {error}"),
                Some(SessionEvent::Disconnected) | None => {
                    eprintln!("Session closed by server");
                    return Ok(());
                },
                Some(SessionEvent::Connected) => eprintln!("Connected as {}", client.jid().await.unwrap_or_default()),
            },
        }
    }
}

// Helper functions

fn load_config(
    path: Option<PathBuf>,
    url: Option<String>,
    domain: Option<String>,
) -> anyhow::Result<BoshConfig> {
    let mut config = match (path, &url, &domain) {
        (Some(path), _, _) => BoshConfig::from_file(path)?,
        (None, Some(url), Some(domain)) => BoshConfig::new(url, domain),
        (None, _, _) => BoshConfig::from_env()
            .map_err(|e| anyhow::anyhow!("{e} (pass --url and --domain, or --config)"))?,
    };

    if let Some(url) = url {
        config.url = url;
    }
    if let Some(domain) = domain {
        config.domain = domain;
    }
    config.validate()?;
    Ok(config)
}

fn write_output(output: Option<PathBuf>, content: &str) -> anyhow::Result<()> {
    if let Some(path) = output {
        std::fs::write(path, content)?;
    } else {
        println!("{content}");
    }
    Ok(())
}
