//! Process and port helpers for end-to-end tests that run the bridge binaries.

use anyhow::Context as _;
use std::net::TcpListener;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

/// Child process that is killed (and reaped) when the handle goes out of scope.
pub struct KillOnDrop(pub Child);

impl Drop for KillOnDrop {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

/// Spawn `program` with `args`, inheriting stderr so its logs show up in test output.
///
/// # Errors
///
/// Returns an error if the process cannot be started.
pub fn spawn_process(program: impl AsRef<Path>, args: &[&str]) -> anyhow::Result<KillOnDrop> {
    let program = program.as_ref();
    let child = Command::new(program)
        .args(args)
        .env("RUST_LOG", "info")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::inherit())
        .spawn()
        .with_context(|| format!("spawn {}", program.display()))?;
    Ok(KillOnDrop(child))
}

/// Pick an unused TCP port on localhost.
///
/// Note: this does not reserve the port; it's still possible for another process to bind it
/// before you do.
///
/// # Errors
///
/// Returns an error if binding an ephemeral localhost port fails or if the bound socket's
/// local address cannot be read.
pub fn pick_unused_port() -> anyhow::Result<u16> {
    let listener = TcpListener::bind("127.0.0.1:0").context("bind ephemeral port")?;
    Ok(listener.local_addr()?.port())
}

/// Poll an HTTP URL until it returns a 2xx status.
///
/// # Errors
///
/// Returns an error if the timeout elapses before the endpoint answers successfully.
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
