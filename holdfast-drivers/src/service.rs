//! Driver-executable plumbing: install the binary, clear out stale driver
//! processes, spawn a fresh one, and connect a client to it.
//!
//! CI pipelines bundle driver binaries next to the suite rather than relying
//! on whatever is on `PATH`; [`install_driver_binary`] and
//! [`binary_name_from_resource`] exist for that workflow. A crashed run can
//! leave a driver squatting on the port, so [`kill_stale_drivers`] sweeps by
//! image name before a launch.

use anyhow::{anyhow, bail, Context, Result};
use fantoccini::{Client, ClientBuilder};
use holdfast_common::BrowserKind;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::time::sleep;
use tracing::{debug, info, warn};
use url::Url;
use webdriver::capabilities::Capabilities;

const CONNECT_ATTEMPTS: u32 = 10;
const CONNECT_DELAY: Duration = Duration::from_millis(500);

/// Platform file name of the WebDriver executable for `kind`.
pub fn driver_binary_name(kind: BrowserKind) -> String {
    let base = match kind {
        BrowserKind::Chrome => "chromedriver",
        BrowserKind::Firefox => "geckodriver",
        BrowserKind::Edge => "msedgedriver",
    };
    format!("{base}{}", std::env::consts::EXE_SUFFIX)
}

/// Recover `file.ext` from a dotted resource path such as
/// `suite.drivers.chromedriver.exe`: the last two segments are the file name
/// and extension.
pub fn binary_name_from_resource(resource_name: &str) -> Result<String> {
    if resource_name.trim().is_empty() {
        bail!("a valid resource name must be provided");
    }

    let segments: Vec<&str> = resource_name.split('.').collect();
    match segments.as_slice() {
        [.., name, ext] => Ok(format!("{name}.{ext}")),
        _ => Err(anyhow!(
            "could not extract a file name from resource name '{resource_name}'"
        )),
    }
}

/// Copy a driver executable into `dest_dir` unless it is already there.
///
/// Returns the destination path. An existing file is never clobbered — a
/// running driver may be holding it open.
pub async fn install_driver_binary(source: &Path, dest_dir: &Path) -> Result<PathBuf> {
    let metadata = tokio::fs::metadata(source)
        .await
        .with_context(|| format!("driver binary not found at {}", source.display()))?;
    if !metadata.is_file() {
        bail!("driver binary path {} is not a file", source.display());
    }

    let file_name = source
        .file_name()
        .ok_or_else(|| anyhow!("driver binary path {} has no file name", source.display()))?;
    let dest = dest_dir.join(file_name);

    if tokio::fs::try_exists(&dest).await.unwrap_or(false) {
        debug!(target: "holdfast.service", dest = %dest.display(), "driver already installed");
        return Ok(dest);
    }

    tokio::fs::create_dir_all(dest_dir)
        .await
        .with_context(|| format!("failed to create {}", dest_dir.display()))?;
    tokio::fs::copy(source, &dest)
        .await
        .with_context(|| format!("failed to copy driver to {}", dest.display()))?;

    info!(target: "holdfast.service", dest = %dest.display(), "driver binary installed");
    Ok(dest)
}

/// Best-effort kill of leftover driver processes for `kind`.
///
/// Failures are logged and swallowed: a missing process is the desired
/// outcome, and lacking permission to kill someone else's driver must not
/// abort a launch.
pub async fn kill_stale_drivers(kind: BrowserKind) {
    kill_by_image_name(&driver_binary_name(kind)).await;
}

async fn kill_by_image_name(image: &str) {
    #[cfg(unix)]
    let status = Command::new("pkill").args(["-x", image]).status().await;
    #[cfg(windows)]
    let status = Command::new("taskkill").args(["/F", "/IM", image]).status().await;

    match status {
        Ok(status) if status.success() => {
            info!(target: "holdfast.service", %image, "killed stale driver process(es)");
            // Give the OS a beat to release the listening port.
            sleep(Duration::from_millis(250)).await;
        }
        Ok(_) => {
            debug!(target: "holdfast.service", %image, "no stale driver processes found");
        }
        Err(err) => {
            warn!(target: "holdfast.service", %image, error = %err, "failed to run process kill");
        }
    }
}

/// WebDriver capabilities for `kind`, with headless switches when asked.
pub fn build_capabilities(kind: BrowserKind, headless: bool) -> Capabilities {
    let mut caps = Capabilities::new();
    match kind {
        BrowserKind::Chrome | BrowserKind::Edge => {
            let mut args: Vec<String> = Vec::new();
            if headless {
                args.push("--headless".into());
                args.push("--disable-gpu".into());
            }
            let key = match kind {
                BrowserKind::Chrome => "goog:chromeOptions",
                _ => "ms:edgeOptions",
            };
            caps.insert(key.to_string(), json!({ "args": args }));
        }
        BrowserKind::Firefox => {
            let args: Vec<String> = if headless {
                vec!["-headless".into()]
            } else {
                Vec::new()
            };
            caps.insert("moz:firefoxOptions".to_string(), json!({ "args": args }));
        }
    }
    caps
}

/// A spawned WebDriver executable and the endpoint it listens on.
///
/// The child is killed on drop, so a panicking test cannot leak a driver
/// process.
pub struct DriverService {
    child: Option<Child>,
    endpoint: String,
}

impl DriverService {
    /// Spawn the driver at `binary` on `port` and connect a client to it.
    ///
    /// Driver processes take a beat to open their socket, so the connection
    /// is retried a bounded number of times before giving up.
    pub async fn launch(
        kind: BrowserKind,
        binary: &Path,
        port: u16,
        headless: bool,
    ) -> Result<(Self, Client)> {
        let child = Command::new(binary)
            .arg(format!("--port={port}"))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn driver {}", binary.display()))?;

        let endpoint = format!("http://localhost:{port}");
        info!(target: "holdfast.service", %endpoint, binary = %binary.display(), "driver spawned");

        let client = connect_with_retry(&endpoint, build_capabilities(kind, headless)).await?;

        Ok((
            Self {
                child: Some(child),
                endpoint,
            },
            client,
        ))
    }

    /// Attach to an already-running driver at `endpoint`.
    pub async fn connect(endpoint: &str, kind: BrowserKind, headless: bool) -> Result<Client> {
        connect_with_retry(endpoint, build_capabilities(kind, headless)).await
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Kill the driver process. Sessions on it must be closed first.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(mut child) = self.child.take() {
            child
                .kill()
                .await
                .context("failed to kill driver process")?;
        }
        Ok(())
    }
}

async fn connect_with_retry(endpoint: &str, caps: Capabilities) -> Result<Client> {
    Url::parse(endpoint).with_context(|| format!("invalid WebDriver endpoint '{endpoint}'"))?;

    let mut attempt: u32 = 1;
    loop {
        match ClientBuilder::native()
            .capabilities(caps.clone())
            .connect(endpoint)
            .await
        {
            Ok(client) => return Ok(client),
            Err(err) if attempt < CONNECT_ATTEMPTS => {
                debug!(
                    target: "holdfast.service",
                    attempt,
                    error = %err,
                    "driver not accepting connections yet"
                );
                attempt += 1;
                sleep(CONNECT_DELAY).await;
            }
            Err(err) => {
                return Err(anyhow::Error::from(err)).with_context(|| {
                    format!("could not connect to WebDriver at {endpoint} after {CONNECT_ATTEMPTS} attempts")
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_names_cover_every_kind() {
        let suffix = std::env::consts::EXE_SUFFIX;
        assert_eq!(
            driver_binary_name(BrowserKind::Chrome),
            format!("chromedriver{suffix}")
        );
        assert_eq!(
            driver_binary_name(BrowserKind::Firefox),
            format!("geckodriver{suffix}")
        );
        assert_eq!(
            driver_binary_name(BrowserKind::Edge),
            format!("msedgedriver{suffix}")
        );
    }

    #[test]
    fn resource_name_keeps_the_last_two_segments() {
        assert_eq!(
            binary_name_from_resource("suite.drivers.chromedriver.exe").unwrap(),
            "chromedriver.exe"
        );
        assert_eq!(
            binary_name_from_resource("geckodriver.bin").unwrap(),
            "geckodriver.bin"
        );
    }

    #[test]
    fn resource_name_without_a_dot_is_rejected() {
        assert!(binary_name_from_resource("chromedriver").is_err());
        assert!(binary_name_from_resource("").is_err());
        assert!(binary_name_from_resource("   ").is_err());
    }

    #[test]
    fn chrome_capabilities_carry_headless_args() {
        let caps = build_capabilities(BrowserKind::Chrome, true);
        let args = caps["goog:chromeOptions"]["args"].as_array().unwrap();
        assert!(args.contains(&json!("--headless")));
        assert!(args.contains(&json!("--disable-gpu")));

        let caps = build_capabilities(BrowserKind::Chrome, false);
        let args = caps["goog:chromeOptions"]["args"].as_array().unwrap();
        assert!(args.is_empty());
    }

    #[test]
    fn firefox_uses_its_own_headless_flag() {
        let caps = build_capabilities(BrowserKind::Firefox, true);
        let args = caps["moz:firefoxOptions"]["args"].as_array().unwrap();
        assert_eq!(args, &vec![json!("-headless")]);
    }

    #[test]
    fn edge_capabilities_use_the_edge_options_key() {
        let caps = build_capabilities(BrowserKind::Edge, true);
        assert!(caps.contains_key("ms:edgeOptions"));
        assert!(!caps.contains_key("goog:chromeOptions"));
    }

    #[tokio::test]
    async fn install_copies_once_and_never_clobbers() {
        let src_dir = tempfile::tempdir().unwrap();
        let dest_dir = tempfile::tempdir().unwrap();

        let source = src_dir.path().join("chromedriver");
        tokio::fs::write(&source, b"driver-v1").await.unwrap();

        let installed = install_driver_binary(&source, dest_dir.path()).await.unwrap();
        assert_eq!(installed, dest_dir.path().join("chromedriver"));
        assert_eq!(tokio::fs::read(&installed).await.unwrap(), b"driver-v1");

        // A newer source must not overwrite an existing install.
        tokio::fs::write(&source, b"driver-v2").await.unwrap();
        let again = install_driver_binary(&source, dest_dir.path()).await.unwrap();
        assert_eq!(again, installed);
        assert_eq!(tokio::fs::read(&again).await.unwrap(), b"driver-v1");
    }

    #[tokio::test]
    async fn install_creates_the_destination_directory() {
        let src_dir = tempfile::tempdir().unwrap();
        let dest_root = tempfile::tempdir().unwrap();
        let nested = dest_root.path().join("bin").join("drivers");

        let source = src_dir.path().join("geckodriver");
        tokio::fs::write(&source, b"gecko").await.unwrap();

        let installed = install_driver_binary(&source, &nested).await.unwrap();
        assert!(tokio::fs::try_exists(&installed).await.unwrap());
    }

    #[tokio::test]
    async fn install_rejects_a_missing_source() {
        let dest_dir = tempfile::tempdir().unwrap();
        let err = install_driver_binary(Path::new("/no/such/driver"), dest_dir.path())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[tokio::test]
    async fn killing_an_absent_image_is_not_an_error() {
        // Nothing by this name will be running; the sweep must still return
        // normally.
        kill_by_image_name("holdfast-no-such-driver").await;
    }
}
