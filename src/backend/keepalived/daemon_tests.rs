// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `daemon.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_config_replaces_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("keepalived.conf");
        let control = ShellDaemonControl::new();

        control.write_config(&path, "first").await.unwrap();
        control.write_config(&path, "second").await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "second");
    }

    #[tokio::test]
    async fn test_write_config_to_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("keepalived.conf");

        let err = ShellDaemonControl::new()
            .write_config(&path, "x")
            .await
            .unwrap_err();

        assert!(matches!(err, LocalDaemonError::ConfigWrite { .. }));
    }

    #[tokio::test]
    async fn test_run_reports_exit_status() {
        let control = ShellDaemonControl::new();

        assert!(control.run("true").await.is_ok());

        let err = control.run("echo oops >&2; exit 3").await.unwrap_err();
        match err {
            LocalDaemonError::CommandFailed { command, reason } => {
                assert_eq!(command, "echo oops >&2; exit 3");
                assert!(reason.contains("oops"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_set_sysctl_under_custom_root() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("net/ipv4")).unwrap();
        let control = ShellDaemonControl::with_sysctl_root(dir.path());

        control
            .set_sysctl("net/ipv4/ip_nonlocal_bind", "1")
            .await
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(dir.path().join("net/ipv4/ip_nonlocal_bind")).unwrap(),
            "1"
        );
    }

    #[tokio::test]
    async fn test_recording_control_failures() {
        let control = RecordingDaemonControl::new();
        control.fail_writes(true);
        control.fail_commands(true);

        assert!(control
            .write_config(Path::new("/tmp/x"), "cfg")
            .await
            .is_err());
        assert!(control.run("service keepalived reload").await.is_err());
        assert!(control.configs().is_empty());
        assert_eq!(control.commands(), vec!["service keepalived reload"]);
    }
}
