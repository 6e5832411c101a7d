use course_session::clock::{Clock, SystemClock};
use course_session::config::{self, AppConfig};
use course_session::registry::DeviceRegistry;
use course_session::session::{
    ActivityKind, ChannelObserver, ExpiryReason, SessionCommand, SessionController, SessionDriver,
    SessionEvent, SessionHandle, SessionSnapshot,
};
use course_session::storage;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const HELP: &str = "commands: login <user> | logout | extend | activity | status | whoami | clear | help | quit";

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "course_session=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    let config = match config::load_config_with_fallback() {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("{} Using defaults.", e);
            Arc::new(AppConfig::default())
        }
    };

    let store = storage::create_store(&config.storage);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let registry = Arc::new(DeviceRegistry::open(store.clone(), clock.clone()).await);
    tracing::info!("Device identity: {}", registry.current_device_id());

    if config.session.is_hard_expired(clock.now()) {
        tracing::warn!(
            "Hard expiry deadline {} has passed; every login will be refused",
            config.session.hard_expiry_deadline
        );
    }

    let (observer, mut events) = ChannelObserver::new();
    let controller = SessionController::new(
        registry.clone(),
        store,
        clock,
        Arc::new(observer),
        config.session.clone(),
    );
    let (handle, driver) = SessionDriver::spawn(controller);

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::Warning { remaining } => println!(
                    "! Session expiring soon: {}s left. Type 'extend' to stay signed in.",
                    remaining.num_seconds()
                ),
                SessionEvent::Expired { reason } => match reason {
                    ExpiryReason::IdleTimeout => {
                        println!("! Session expired. Please log in again.")
                    }
                    ExpiryReason::HardDeadline => {
                        println!("! Access period has ended. Sessions are no longer available.")
                    }
                    ExpiryReason::Logout => println!("You have been logged out."),
                },
            }
        }
    });

    println!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::error!("Failed to read input: {}", e);
                break;
            }
        };

        if !run_command(line.trim(), &registry, &handle).await {
            break;
        }
    }

    handle.shutdown().await;
    if let Err(e) = driver.await {
        tracing::error!("Session driver failed: {}", e);
    }
}

/// Execute one input line; returns false when the user asked to quit
async fn run_command(line: &str, registry: &DeviceRegistry, handle: &SessionHandle) -> bool {
    let mut parts = line.split_whitespace();
    let Some(command) = parts.next() else {
        // Any keystroke counts as activity
        handle.activity(ActivityKind::KeyPress).await;
        return true;
    };

    match command {
        "login" => {
            let Some(username) = parts.next() else {
                println!("usage: login <user>");
                return true;
            };
            let current = handle.snapshot();
            if current.is_authenticated {
                println!(
                    "Already logged in as {}; log out first",
                    current.current_user.as_deref().unwrap_or("-")
                );
                return true;
            }
            if let Some(bound) = registry.has_active_session_on_device().await
                && bound != username
            {
                println!("Login failed: {} is bound to this device; log out first", bound);
                return true;
            }
            if !registry.login(username).await {
                println!(
                    "Login failed: {} is already logged in on another device",
                    username
                );
                return true;
            }

            match handle.execute(SessionCommand::Login).await {
                Some(snapshot) if snapshot.is_authenticated => println!(
                    "Welcome, {}",
                    snapshot.current_user.as_deref().unwrap_or(username)
                ),
                _ => println!("Login failed: session could not be started"),
            }
        }
        "logout" => {
            handle.logout().await;
        }
        "extend" => {
            let snapshot = handle.extend().await;
            if snapshot.is_authenticated {
                println!("Session extended");
            }
        }
        "activity" => {
            handle.activity(ActivityKind::Click).await;
        }
        "status" => print_status(&handle.snapshot()),
        "whoami" => match registry.has_active_session_on_device().await {
            Some(username) => println!(
                "{} on device {}",
                username,
                registry.current_device_id()
            ),
            None => println!("nobody on device {}", registry.current_device_id()),
        },
        "clear" => {
            registry.clear_all_sessions().await;
            println!("All device bindings cleared");
        }
        "help" => println!("{}", HELP),
        "quit" | "exit" => return false,
        other => println!("unknown command '{}'; {}", other, HELP),
    }

    true
}

fn print_status(snapshot: &SessionSnapshot) {
    println!(
        "phase={:?} user={} warning={} remaining={}s",
        snapshot.phase(),
        snapshot.current_user.as_deref().unwrap_or("-"),
        snapshot.show_warning,
        snapshot.remaining_time.num_seconds()
    );
}
