// Event loop running a session controller on a single tokio task

use super::controller::SessionController;
use super::types::{ActivityKind, SessionSnapshot};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Operations presentation code can request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Login,
    Logout,
    Extend,
    Activity(ActivityKind),
}

enum Message {
    Command(SessionCommand, oneshot::Sender<SessionSnapshot>),
    Shutdown,
}

/// Cloneable client side of a running [`SessionDriver`]
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<Message>,
    snapshot: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    /// Run `command` on the driver and return the resulting state.
    ///
    /// Returns None once the driver has stopped.
    pub async fn execute(&self, command: SessionCommand) -> Option<SessionSnapshot> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(Message::Command(command, reply_tx)).await.is_err() {
            debug!("Session driver stopped, dropping {:?}", command);
            return None;
        }
        reply_rx.await.ok()
    }

    pub async fn login(&self) -> bool {
        self.execute(SessionCommand::Login)
            .await
            .is_some_and(|snapshot| snapshot.is_authenticated)
    }

    pub async fn logout(&self) -> SessionSnapshot {
        self.execute(SessionCommand::Logout)
            .await
            .unwrap_or_default()
    }

    pub async fn extend(&self) -> SessionSnapshot {
        self.execute(SessionCommand::Extend)
            .await
            .unwrap_or_default()
    }

    pub async fn activity(&self, kind: ActivityKind) -> SessionSnapshot {
        self.execute(SessionCommand::Activity(kind))
            .await
            .unwrap_or_default()
    }

    /// Latest published state
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Ask the driver to stop; pending timers are dropped without firing
    pub async fn shutdown(&self) {
        let _ = self.tx.send(Message::Shutdown).await;
    }
}

/// Owns a controller and sleeps until its next timer deadline or command
pub struct SessionDriver;

impl SessionDriver {
    /// Spawn the driver loop. The controller restores any persisted session first.
    pub fn spawn(controller: SessionController) -> (SessionHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(64);
        let (snapshot_tx, snapshot_rx) = watch::channel(controller.snapshot());

        let task = tokio::spawn(run(controller, rx, snapshot_tx));
        let handle = SessionHandle {
            tx,
            snapshot: snapshot_rx,
        };
        (handle, task)
    }
}

async fn run(
    mut controller: SessionController,
    mut messages: mpsc::Receiver<Message>,
    snapshot: watch::Sender<SessionSnapshot>,
) {
    controller.restore().await;
    snapshot.send_replace(controller.snapshot());
    info!("Session driver started");

    loop {
        let wait = controller.next_deadline().map(|at| {
            (at - controller.clock().now())
                .to_std()
                .unwrap_or(std::time::Duration::ZERO)
        });

        tokio::select! {
            message = messages.recv() => match message {
                Some(Message::Command(command, reply)) => {
                    // Overdue timers fire before the command is applied
                    controller.poll().await;
                    apply(&mut controller, command).await;
                    let current = controller.snapshot();
                    snapshot.send_replace(current.clone());
                    let _ = reply.send(current);
                }
                Some(Message::Shutdown) | None => break,
            },
            _ = tokio::time::sleep(wait.unwrap_or_default()), if wait.is_some() => {
                controller.poll().await;
                snapshot.send_replace(controller.snapshot());
            }
        }
    }

    info!("Session driver stopped");
}

async fn apply(controller: &mut SessionController, command: SessionCommand) {
    match command {
        SessionCommand::Login => {
            controller.login().await;
        }
        SessionCommand::Logout => controller.logout().await,
        SessionCommand::Extend => controller.extend_session().await,
        SessionCommand::Activity(kind) => controller.record_activity(kind).await,
    }
}
