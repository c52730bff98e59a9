use log::warn;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Resolve once the process is asked to stop.
///
/// Listens for ctrl-c everywhere, plus `SIGTERM` and `SIGQUIT` on unix. A
/// listener that cannot be installed never fires.
pub async fn shutdown() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for ctrl-c: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let second_signal = async {
        match (signal(SignalKind::terminate()), signal(SignalKind::quit())) {
            (Ok(mut terminate), Ok(mut quit)) => {
                tokio::select! {
                    _ = terminate.recv() => (),
                    _ = quit.recv() => (),
                }
            }
            (Err(err), _) | (_, Err(err)) => {
                warn!("failed to listen for termination signals: {err}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let second_signal = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => (),
        () = second_signal => (),
    }
}
