use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn main() {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let path = std::env::args()
        .nth(1)
        .expect("Argument 1 needs to be a path");

    tracing::info!("Watching {path}");

    if let Err(error) = watch(&path) {
        tracing::error!("Error: {error:?}");
    }
}

#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly",
))]
fn watch(path: &str) -> inotify_kqueue::Result<()> {
    use inotify_kqueue::{Config, EventMask, Inotify};

    let (tx, rx) = std::sync::mpsc::channel();

    let mut watcher = Inotify::new(tx, Config::default())?;
    watcher.add_watch(std::path::Path::new(path), EventMask::ALL_EVENTS)?;

    for event in rx {
        tracing::info!("Change: {event:?}");
    }

    Ok(())
}

#[cfg(not(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly",
)))]
fn watch(_path: &str) -> inotify_kqueue::Result<()> {
    Err(inotify_kqueue::Error::generic(
        "kqueue is not available on this platform",
    ))
}
