// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the controller command handler

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::backend::keepalived::daemon::RecordingDaemonControl;
    use crate::backend::keepalived::{KeepalivedBackend, KeepalivedConfig};
    use crate::config::ConfigGroup;
    use std::net::Ipv4Addr;
    use std::path::PathBuf;

    fn group(name: &str, bind_port: u16) -> ConfigGroup {
        ConfigGroup {
            name: name.to_string(),
            host: String::new(),
            namespace: "default".to_string(),
            bind_ip: Some(Ipv4Addr::new(10, 1, 0, 1)),
            bind_port,
            target_service_name: "frontend".to_string(),
            target_service_id: String::new(),
            target_port: 0,
            ssl: false,
            ssl_port: 0,
            path: String::new(),
        }
    }

    fn keepalived(control: Arc<RecordingDaemonControl>) -> Arc<Backend> {
        let backend = KeepalivedBackend::new(
            KeepalivedConfig {
                config_path: PathBuf::from("/tmp/keepalived.conf"),
                interface: "eth0".to_string(),
                start_command: "start".to_string(),
                reload_command: "reload".to_string(),
            },
            control,
            None,
        );
        Arc::new(Backend::Keepalived(backend))
    }

    fn handler(
        control: Arc<RecordingDaemonControl>,
    ) -> (BackendHandler, mpsc::UnboundedReceiver<BackendError>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (BackendHandler::new(keepalived(control), tx), rx)
    }

    async fn held_vips(backend: &Backend) -> Vec<Ipv4Addr> {
        match backend {
            Backend::Keepalived(keepalived) => keepalived.held_vips().await,
            Backend::Appliance(_) => Vec::new(),
        }
    }

    /// Delays every command before handing it to the backend.
    struct Delayed {
        inner: BackendHandler,
        delay: Duration,
    }

    #[async_trait]
    impl CommandHandler for Delayed {
        async fn handle(&self, command: Command) {
            tokio::time::sleep(self.delay).await;
            self.inner.handle(command).await;
        }
    }

    fn delayed_dispatcher(backend: &Arc<Backend>, delay: Duration) -> Dispatcher<Delayed> {
        let (tx, _rx) = mpsc::unbounded_channel();
        let inner = BackendHandler::new(backend.clone(), tx);
        Dispatcher::new(Arc::new(Delayed { inner, delay }), Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_successful_command_reports_nothing() {
        let control = Arc::new(RecordingDaemonControl::new());
        let (handler, mut rx) = handler(control.clone());

        handler.handle(Command::Provision(group("web", 80))).await;

        assert!(rx.try_recv().is_err());
        assert_eq!(control.commands(), vec!["reload"]);
    }

    #[tokio::test]
    async fn test_validation_failure_is_not_fatal() {
        let control = Arc::new(RecordingDaemonControl::new());
        let (handler, mut rx) = handler(control.clone());

        handler.handle(Command::Provision(group("web", 0))).await;

        assert!(rx.try_recv().is_err());
        assert!(control.commands().is_empty());
    }

    #[tokio::test]
    async fn test_fatal_failure_is_forwarded() {
        let control = Arc::new(RecordingDaemonControl::new());
        control.fail_writes(true);
        let (handler, mut rx) = handler(control);

        handler.handle(Command::Provision(group("web", 80))).await;

        let err = rx.try_recv().unwrap();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_shutdown_hook_runs_after_in_flight_commands() {
        let control = Arc::new(RecordingDaemonControl::new());
        let backend = keepalived(control.clone());
        let dispatcher = delayed_dispatcher(&backend, Duration::from_millis(50));

        dispatcher.dispatch(Command::Provision(group("web", 80)));
        shut_down(&dispatcher, &backend, Duration::from_secs(5)).await;

        assert!(held_vips(&backend).await.is_empty());
        assert_eq!(control.commands(), vec!["reload", "reload"]);
        let configs = control.configs();
        assert!(configs[0].contains("10.1.0.1"));
        assert!(!configs[1].contains("10.1.0.1"));
    }

    #[tokio::test]
    async fn test_shutdown_hook_runs_when_worker_exceeds_grace() {
        let control = Arc::new(RecordingDaemonControl::new());
        let backend = keepalived(control.clone());
        let dispatcher = delayed_dispatcher(&backend, Duration::from_secs(60));

        dispatcher.dispatch(Command::Provision(group("web", 80)));
        tokio::time::timeout(
            Duration::from_secs(5),
            shut_down(&dispatcher, &backend, Duration::from_millis(20)),
        )
        .await
        .unwrap();

        assert!(held_vips(&backend).await.is_empty());
        assert_eq!(control.commands(), vec!["reload"]);
        assert_eq!(dispatcher.active_workers(), 0);
    }
}
