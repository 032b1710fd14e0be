//! Shared fixtures: fake tool scripts and polling helpers.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

/// Write an executable `/bin/sh` script and return its path.
#[cfg(unix)]
pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Fake analysis tool: records its arguments, extraction mode and working
/// directory next to `record`, then writes a log and a state directory.
#[cfg(unix)]
pub fn fake_zeek(dir: &Path, record: &Path) -> PathBuf {
    let record = record.display();
    write_script(
        dir,
        "zeek",
        &format!(
            r##"printf '%s\n' "$@" > "{record}"
printf '%s\n' "$ZEEK_EXTRACTOR_MODE" > "{record}.env"
pwd > "{record}.cwd"
echo "#fields ts uid" > conn.log
echo "#fields ts fuid" > files.log
mkdir -p .state
echo state > .state/clock"##
        ),
    )
}

/// Fake capture tool: appends its arguments as one line to `record`.
#[cfg(unix)]
pub fn fake_moloch(dir: &Path, record: &Path) -> PathBuf {
    let record = record.display();
    write_script(dir, "moloch-capture", &format!(r#"echo "$*" >> "{record}""#))
}

/// Poll `check` every 20ms until it returns true or `timeout` elapses.
pub async fn wait_for(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

/// Create an empty capture file and return its path.
pub fn touch_capture(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"\xd4\xc3\xb2\xa1").unwrap();
    path
}

/// Notification source fed from a channel. Once every sender is dropped it
/// stays pending, like an idle socket.
pub struct ChannelSource {
    rx: tokio::sync::mpsc::UnboundedReceiver<Vec<u8>>,
}

impl ChannelSource {
    pub fn channel() -> (tokio::sync::mpsc::UnboundedSender<Vec<u8>>, Self) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (tx, Self { rx })
    }
}

impl pcap_dispatcher::subscriber::NotificationSource for ChannelSource {
    async fn recv(&mut self) -> pcap_dispatcher::error::Result<Vec<u8>> {
        match self.rx.recv().await {
            Some(payload) => Ok(payload),
            None => std::future::pending().await,
        }
    }
}

/// Encode a notification payload.
pub fn notification(name: &Path, tags: &[&str]) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "name": name.display().to_string(),
        "tags": tags,
    }))
    .unwrap()
}
