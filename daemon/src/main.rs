use std::sync::Arc;

use common::{
    config::Config,
    courier_err,
    icon::HttpFetcher,
    logging,
    utils::errors::{CourierError, CourierErrorKind},
};
use tokio::{net::UnixListener, sync::mpsc};
use zbus::Connection;

use crate::{
    clock::SystemClock,
    dispatcher::{DispatchPolicy, Dispatcher},
    platform::{BrowserTabs, DbusNotifier, NativeSignal},
};

mod clock;
mod correlation;
mod dispatcher;
mod platform;
mod server;

#[tokio::main]
async fn main() -> Result<(), CourierError> {
    logging::init();

    let config = Config::load()?;
    let conn = Connection::session()
        .await
        .map_err(|e| courier_err!(CourierErrorKind::DBusConnect, e.to_string()))?;

    let notifier = Arc::new(DbusNotifier::new(conn, &config).await?);
    let tabs = Arc::new(BrowserTabs::new());
    let dispatcher = Arc::new(Dispatcher::new(
        DispatchPolicy::from_config(&config),
        notifier.clone(),
        tabs.clone(),
        Arc::new(SystemClock),
        Arc::new(HttpFetcher::new()?),
    ));

    let (signal_tx, signal_rx) = mpsc::channel::<NativeSignal>(64);
    {
        let notifier = notifier.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.listen(signal_tx).await {
                tracing::error!("Notification signals unavailable: {}", e);
            }
        });
    }

    {
        let dispatcher = dispatcher.clone();
        tokio::spawn(async move { dispatcher.run_signals(signal_rx).await });
    }

    {
        let dispatcher = dispatcher.clone();
        let period = config.sweep_interval();
        let icon_age = config.retention();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                dispatcher.sweep();
                let pruned = notifier.prune_icons(icon_age);
                if pruned > 0 {
                    tracing::debug!("Pruned {} cached icons", pruned);
                }
            }
        });
    }

    let _ = std::fs::remove_file(&config.socket_path);
    let listener = UnixListener::bind(&config.socket_path).map_err(|e| {
        courier_err!(
            CourierErrorKind::StreamBind,
            "{}: {}",
            config.socket_path.display(),
            e.to_string()
        )
    })?;
    tracing::info!("Daemon listening on {}", config.socket_path.display());

    let result = tokio::select! {
        served = server::serve(listener, dispatcher, tabs) => served,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
            Ok(())
        }
    };

    let _ = std::fs::remove_file(&config.socket_path);
    result
}
