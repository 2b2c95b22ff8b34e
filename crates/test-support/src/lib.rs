//! Helpers shared by the integration tests that spawn the `apigate` binary.

use anyhow::Context as _;
use std::net::TcpListener;
use std::process::Child;
use std::time::{Duration, Instant};

/// Kills (and reaps) the wrapped child process when dropped.
pub struct KillOnDrop(pub Child);

impl Drop for KillOnDrop {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

/// Pick an unused TCP port on localhost.
///
/// The port is not reserved; another process may still bind it first.
///
/// # Errors
///
/// Returns an error if no ephemeral port can be bound.
pub fn pick_unused_port() -> anyhow::Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").context("bind ephemeral port")?;
    Ok(listener.local_addr()?.port())
}

/// Poll `url` until it answers with a 2xx status.
///
/// # Errors
///
/// Returns an error if `timeout_dur` elapses first.
pub async fn wait_http_ok(url: &str, timeout_dur: Duration) -> anyhow::Result<()> {
    let client = reqwest::Client::new();
    let start = Instant::now();
    loop {
        match client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => return Ok(()),
            _ if start.elapsed() > timeout_dur => anyhow::bail!("timed out waiting for {url}"),
            _ => tokio::time::sleep(Duration::from_millis(100)).await,
        }
    }
}

/// Wait for `child` to exit on its own, killing it after `timeout_dur`.
///
/// # Errors
///
/// Returns an error if the child is still running after `timeout_dur`.
pub async fn wait_exit(
    child: &mut Child,
    timeout_dur: Duration,
) -> anyhow::Result<std::process::ExitStatus> {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().context("poll child")? {
            return Ok(status);
        }
        if start.elapsed() > timeout_dur {
            let _ = child.kill();
            anyhow::bail!("process did not exit within {timeout_dur:?}");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
