// signals.rs — Turn SIGINT/SIGTERM into an emergency stop.
//
// Handlers are registered on the calling thread before `watch` returns, so
// a signal arriving right after startup is never lost to the default
// disposition. A background thread then drives a single-threaded tokio
// runtime that waits for signals and calls `PolicyEngine::emergency_stop`,
// which logs and audits from ordinary thread context.

use std::io;
use std::sync::Arc;
use std::thread;

use raeio_policy::PolicyEngine;

pub fn watch(engine: Arc<PolicyEngine>) -> io::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let mut shutdown = {
        let _guard = runtime.enter();
        Shutdown::register()?
    };

    thread::Builder::new()
        .name("raeio-signals".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                // Every delivery is audited; the flag stays set after the first.
                while let Some(name) = shutdown.recv().await {
                    tracing::warn!(signal = name, "shutdown signal received");
                    let _ = engine.emergency_stop();
                }
            })
        })?;
    Ok(())
}

#[cfg(unix)]
struct Shutdown {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Shutdown {
    fn register() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    async fn recv(&mut self) -> Option<&'static str> {
        tokio::select! {
            r = self.interrupt.recv() => r.map(|_| "SIGINT"),
            r = self.terminate.recv() => r.map(|_| "SIGTERM"),
        }
    }
}

#[cfg(not(unix))]
struct Shutdown;

#[cfg(not(unix))]
impl Shutdown {
    fn register() -> io::Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> Option<&'static str> {
        tokio::signal::ctrl_c().await.ok().map(|_| "Ctrl-C")
    }
}
