/**
 * WhoGoFixAm Session Driver - Main Entry Point
 *
 * Interactive terminal driver for the session layer. It wires the identity
 * toolkit and document database clients to the local cache, starts the
 * reconciler and the network monitor, and runs one command per input line.
 *
 * Pass `--ephemeral` to keep the cache in memory instead of the SQLite file.
 */
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use whogofixam::client::{
    Config, ConnectivityEvent, FirestoreClient, IdentityProvider, IdentityToolkitClient,
    KeyValueStore, LocalDatabase, MemoryStore, NetworkMonitor, PhoneConfirmation,
    SessionError, SessionReconciler,
};
use whogofixam::shared::UserRole;

const HELP: &str = "\
commands:
  signup <email> <password> <role> <display name>
  login <email> <password>
  phone <number> <challenge token>
  confirm <code>
  logout
  role <learner|skilled-professional|customer>
  refresh
  retry
  online | offline
  status
  quit";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file if present
    dotenv::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&env_filter))
        .with_writer(std::io::stderr)
        .init();

    let ephemeral = std::env::args().any(|arg| arg == "--ephemeral");
    let config = Config::from_env()?;
    if !config.has_remote_services() {
        tracing::error!("set WHOGOFIXAM_API_KEY and WHOGOFIXAM_PROJECT_ID to reach the hosted services");
    }

    let identity = Arc::new(IdentityToolkitClient::new(config.app())?);
    let store = Arc::new(FirestoreClient::new(config.app(), identity.subscribe())?);
    let storage: Arc<dyn KeyValueStore> = if ephemeral {
        tracing::info!("using in-memory cache");
        Arc::new(MemoryStore::new())
    } else {
        let path = config.cache_path();
        tracing::info!(path = %path.display(), "opening local cache");
        Arc::new(LocalDatabase::open(&path).await?)
    };

    let reconciler = SessionReconciler::new(identity, store, storage, config.app()).await?;
    let listener = reconciler.listen();

    let monitor = NetworkMonitor::new(reconciler.clone());
    monitor.initialize(true).await;
    let (connectivity, events) = mpsc::channel(16);
    let monitor_task = monitor.clone().spawn(events);

    println!("{}", HELP);
    let mut confirmation: Option<PhoneConfirmation> = None;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let words: Vec<&str> = line.split_whitespace().collect();
        let Some((&command, args)) = words.split_first() else {
            continue;
        };

        let outcome = match (command, args) {
            ("signup", [email, password, role, name @ ..]) if !name.is_empty() => {
                match role.parse::<UserRole>() {
                    Ok(role) => reconciler
                        .signup(email, password, &name.join(" "), role)
                        .await
                        .map(|profile| println!("signed up as {}", profile.uid)),
                    Err(e) => {
                        println!("{}", e);
                        Ok(())
                    }
                }
            }
            ("login", [email, password]) => reconciler
                .login(email, password)
                .await
                .map(|identity| println!("signed in as {}", identity.uid)),
            ("phone", [number, challenge]) => reconciler
                .send_phone_verification(number, challenge)
                .await
                .map(|handle| {
                    println!("code sent to {}", handle.phone_number);
                    confirmation = Some(handle);
                }),
            ("confirm", [code]) => match confirmation.take() {
                Some(handle) => reconciler
                    .confirm_phone(&handle, code)
                    .await
                    .map(|identity| println!("signed in as {}", identity.uid)),
                None => {
                    println!("no verification in progress");
                    Ok(())
                }
            },
            ("logout", []) => reconciler.logout().await,
            ("role", [role]) => match role.parse::<UserRole>() {
                Ok(role) => reconciler
                    .set_role(role)
                    .await
                    .map(|profile| println!("role set for {}", profile.uid)),
                Err(e) => {
                    println!("{}", e);
                    Ok(())
                }
            },
            ("refresh", []) => {
                match reconciler.refresh_profile().await {
                    Some(path) => println!("resolved via {}", path),
                    None => println!("not signed in"),
                }
                Ok(())
            }
            ("retry", []) => {
                if let Some(path) = reconciler.retry_connection().await {
                    println!("resolved via {}", path);
                }
                Ok(())
            }
            ("online", []) => send(&connectivity, ConnectivityEvent::Online).await,
            ("offline", []) => send(&connectivity, ConnectivityEvent::Offline).await,
            ("status", []) => {
                print_status(&reconciler, &monitor);
                Ok(())
            }
            ("help", _) => {
                println!("{}", HELP);
                Ok(())
            }
            ("quit", []) | ("exit", []) => break,
            _ => {
                println!("unrecognized command, try `help`");
                Ok(())
            }
        };

        if let Err(e) = outcome {
            match e.credential_code() {
                Some(code) => println!("rejected: {}", code),
                None => println!("error: {}", e),
            }
        }
    }

    drop(connectivity);
    reconciler.wait_for_background().await;
    listener.abort();
    monitor_task.await?;
    Ok(())
}

async fn send(
    connectivity: &mpsc::Sender<ConnectivityEvent>,
    event: ConnectivityEvent,
) -> Result<(), SessionError> {
    if connectivity.send(event).await.is_err() {
        tracing::warn!(?event, "network monitor stopped");
    }
    Ok(())
}

fn print_status(reconciler: &SessionReconciler, monitor: &NetworkMonitor) {
    let snapshot = reconciler.snapshot();
    println!("phase:      {:?}", snapshot.phase);
    println!("network:    {:?}", monitor.status());
    println!("offline:    {}", snapshot.is_offline);
    match &snapshot.resolution {
        Some(path) => println!("resolution: {}", path),
        None => println!("resolution: -"),
    }
    match &snapshot.profile {
        Some(profile) => {
            println!("uid:        {}", profile.uid);
            println!("email:      {}", profile.email.as_deref().unwrap_or("-"));
            println!("name:       {}", profile.display_name.as_deref().unwrap_or("-"));
            match profile.role {
                Some(role) => println!("role:       {}", role),
                None => println!("role:       - (needs role selection)"),
            }
        }
        None => println!("profile:    -"),
    }
}
