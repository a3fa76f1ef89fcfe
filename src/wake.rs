// SPDX-License-Identifier: GPL-3.0-only
//! Resume-from-suspend notifications
//!
//! logind emits `PrepareForSleep(true)` before suspending and
//! `PrepareForSleep(false)` after resuming. Only the latter matters here: the
//! light in the room may be completely different from when the lid closed.

use tokio::sync::mpsc;

#[cfg(feature = "resume-refresh")]
use zbus::{Connection, proxy};

#[cfg(feature = "resume-refresh")]
use crate::error::Result;

#[cfg(feature = "resume-refresh")]
/// systemd-logind manager D-Bus proxy
#[proxy(
    interface = "org.freedesktop.login1.Manager",
    default_service = "org.freedesktop.login1",
    default_path = "/org/freedesktop/login1"
)]
trait LoginManager {
    /// Emitted with `true` before sleeping and `false` after waking
    #[zbus(signal)]
    fn prepare_for_sleep(&self, start: bool) -> zbus::Result<()>;
}

/// Spawn a task forwarding resume events
///
/// The receiver yields one `()` per resume. If the system bus is unavailable
/// the task logs and ends, which closes the channel.
#[cfg(feature = "resume-refresh")]
pub fn spawn_resume_watcher() -> Option<mpsc::Receiver<()>> {
    let (tx, rx) = mpsc::channel(4);
    tokio::spawn(async move {
        if let Err(e) = watch_resume(tx).await {
            warn!("Resume notifications unavailable: {}", e);
        }
    });
    Some(rx)
}

#[cfg(feature = "resume-refresh")]
async fn watch_resume(tx: mpsc::Sender<()>) -> Result<()> {
    use futures::StreamExt;

    let connection = Connection::system().await?;
    let proxy = LoginManagerProxy::new(&connection).await?;
    let mut signals = proxy.receive_prepare_for_sleep().await?;

    info!("Listening for resume from suspend");

    while let Some(signal) = signals.next().await {
        let args = match signal.args() {
            Ok(args) => args,
            Err(e) => {
                debug!("Ignoring malformed PrepareForSleep signal: {}", e);
                continue;
            }
        };

        if *args.start() {
            debug!("System going to sleep");
            continue;
        }

        info!("System resumed");
        if tx.send(()).await.is_err() {
            break;
        }
    }

    Ok(())
}

/// No resume notifications without logind support
#[cfg(not(feature = "resume-refresh"))]
pub fn spawn_resume_watcher() -> Option<mpsc::Receiver<()>> {
    None
}
