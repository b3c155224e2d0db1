//! Talking to the TL LCD panels through the vendor's `uwscli` tool.
//!
//! The USB transport and the panel's JPEG protocol belong to the vendor; we
//! only drive its command line:
//!
//! ```sh
//! uwscli --output json lcd list
//! uwscli lcd send-jpg --serial <serial> --file -      # JPEG on stdin
//! uwscli lcd brightness --serial <serial> --value <0-100>
//! ```

use crate::error::Error;
use serde::Deserialize;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Operations the pipeline needs from the panels.
///
/// `VendorCli` is the real implementation; tests substitute a recorder.
#[allow(async_fn_in_trait)]
pub trait PanelDriver {
    /// Enumerate attached panels.
    async fn list_devices(&self) -> Result<Vec<LcdDevice>, Error>;

    /// Show a JPEG on the panel with this serial.
    async fn send_jpeg(&self, serial: &str, jpeg: &[u8]) -> Result<(), Error>;

    /// Set backlight brightness (0-100).
    async fn set_brightness(&self, serial: &str, level: u8) -> Result<(), Error>;
}

/// One entry from `uwscli lcd list`.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
pub struct LcdDevice {
    #[serde(default, alias = "serial_number")]
    pub serial: Option<String>,
    /// `wireless` for the TL LCD receivers, `wired` otherwise
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub product: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
}

impl LcdDevice {
    fn is_wireless(&self) -> bool {
        self.source.as_deref() == Some("wireless")
    }

    fn usable_serial(&self) -> Option<&str> {
        self.serial.as_deref().filter(|s| !s.trim().is_empty())
    }
}

// ── Vendor CLI ───────────────────────────────────────────────────────

/// Drives the vendor command line tool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VendorCli {
    program: String,
    /// Leading arguments, e.g. `-m uwscli` when the program is `python3`
    base_args: Vec<String>,
}

impl VendorCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            base_args: Vec::new(),
        }
    }

    /// Split a command line such as `python3 -m uwscli` on whitespace.
    pub fn from_command_line(command: &str) -> Result<Self, Error> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| Error::Config("LCD control command is empty".to_string()))?;
        Ok(Self {
            program,
            base_args: parts.collect(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run one vendor command and return its stdout.
    async fn run(&self, args: &[&str], stdin: Option<&[u8]>, target: &str) -> Result<String, Error> {
        let device_error = |message: String| Error::Device {
            serial: target.to_string(),
            message,
        };

        let mut child = Command::new(&self.program)
            .args(&self.base_args)
            .args(args)
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| device_error(format!("failed to run {}: {}", self.program, e)))?;

        // A tool that rejects the request may exit without reading stdin, so a
        // write error is only reported when the exit status has nothing better.
        let write_error = match (stdin, child.stdin.take()) {
            (Some(bytes), Some(mut pipe)) => {
                let result = pipe.write_all(bytes).await;
                // Close stdin so the tool sees EOF.
                drop(pipe);
                result.err()
            }
            _ => None,
        };

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| device_error(format!("failed to wait for {}: {}", self.program, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let message = if stderr.is_empty() {
                format!("{} exited with {}", self.program, output.status)
            } else {
                stderr
            };
            return Err(device_error(message));
        }
        if let Some(e) = write_error {
            return Err(device_error(format!("failed to write payload: {e}")));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl PanelDriver for VendorCli {
    async fn list_devices(&self) -> Result<Vec<LcdDevice>, Error> {
        let stdout = self
            .run(&["--output", "json", "lcd", "list"], None, "*")
            .await?;
        parse_device_listing(&stdout)
    }

    async fn send_jpeg(&self, serial: &str, jpeg: &[u8]) -> Result<(), Error> {
        self.run(
            &["lcd", "send-jpg", "--serial", serial, "--file", "-"],
            Some(jpeg),
            serial,
        )
        .await?;
        Ok(())
    }

    async fn set_brightness(&self, serial: &str, level: u8) -> Result<(), Error> {
        let value = level.min(100).to_string();
        self.run(
            &["lcd", "brightness", "--serial", serial, "--value", value.as_str()],
            None,
            serial,
        )
        .await?;
        Ok(())
    }
}

/// Parse `lcd list` output: one JSON object per line, or a single JSON array.
pub fn parse_device_listing(stdout: &str) -> Result<Vec<LcdDevice>, Error> {
    let trimmed = stdout.trim();
    if trimmed.starts_with('[') {
        return Ok(serde_json::from_str(trimmed)?);
    }

    trimmed
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| serde_json::from_str(line).map_err(Error::from))
        .collect()
}

// ── Serial resolution ───────────────────────────────────────────────

/// Trim and strip an optional `serial:` prefix.
pub fn normalize_serial(serial: &str) -> Result<String, Error> {
    let value = serial.trim();
    let value = value.strip_prefix("serial:").unwrap_or(value).trim();
    if value.is_empty() {
        return Err(Error::InvalidSerial);
    }
    Ok(value.to_string())
}

/// Panels to drive, in order.
///
/// Explicit serials are normalized (empty entries skipped). Without any,
/// exactly one wireless panel must be attached.
pub async fn resolve_serials<D: PanelDriver>(
    explicit: &[String],
    driver: &D,
) -> Result<Vec<String>, Error> {
    if !explicit.is_empty() {
        return explicit
            .iter()
            .filter(|s| !s.is_empty())
            .map(|s| normalize_serial(s))
            .collect();
    }

    let devices = driver.list_devices().await?;
    let serials: Vec<&str> = devices
        .iter()
        .filter(|d| d.is_wireless())
        .filter_map(LcdDevice::usable_serial)
        .collect();

    match serials.as_slice() {
        [] => Err(Error::NoPanels),
        [only] => {
            tracing::info!("Autodetected TL LCD {}", only);
            Ok(vec![normalize_serial(only)?])
        }
        many => Err(Error::AmbiguousPanels(
            many.iter().map(|s| s.to_string()).collect(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeDriver;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn wireless(serial: &str) -> LcdDevice {
        LcdDevice {
            serial: Some(serial.to_string()),
            source: Some("wireless".to_string()),
            product: Some("TL-LCD Wireless".to_string()),
            path: None,
        }
    }

    #[rstest]
    #[case("abc123", "abc123")]
    #[case("  abc123 ", "abc123")]
    #[case("serial:abc123", "abc123")]
    #[case("serial: abc123", "abc123")]
    fn normalize_serial_accepts(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(normalize_serial(input).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("serial:")]
    #[case("serial:   ")]
    fn normalize_serial_rejects(#[case] input: &str) {
        assert!(matches!(normalize_serial(input), Err(Error::InvalidSerial)));
    }

    #[test]
    fn listing_parses_json_lines() {
        let stdout = r#"{"serial": "abc123", "source": "wireless", "product": "TL-LCD Wireless", "location_id": 291}

{"serial_number": "def456", "source": "wired"}
"#;
        let devices = parse_device_listing(stdout).unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0], wireless("abc123"));
        assert_eq!(devices[1].serial.as_deref(), Some("def456"));
        assert_eq!(devices[1].source.as_deref(), Some("wired"));
    }

    #[test]
    fn listing_parses_json_array_and_empty_output() {
        let devices = parse_device_listing(r#"[{"serial": "x", "source": "wireless"}]"#).unwrap();
        assert_eq!(devices.len(), 1);
        assert!(parse_device_listing("\n").unwrap().is_empty());
        assert!(parse_device_listing("not json").is_err());
    }

    #[test]
    fn command_line_splits_leading_args() {
        let cli = VendorCli::from_command_line("python3 -m uwscli").unwrap();
        assert_eq!(cli.program(), "python3");
        assert_eq!(cli.base_args, vec!["-m", "uwscli"]);
        assert!(VendorCli::from_command_line("   ").is_err());
    }

    #[tokio::test]
    async fn explicit_serials_skip_enumeration() {
        let driver = FakeDriver::default();
        let serials = resolve_serials(
            &["serial:one".to_string(), String::new(), "two".to_string()],
            &driver,
        )
        .await
        .unwrap();
        assert_eq!(serials, vec!["one", "two"]);
        assert_eq!(driver.list_calls(), 0);
    }

    #[tokio::test]
    async fn autodetects_single_wireless_panel() {
        let driver = FakeDriver::with_devices(vec![
            wireless("detected123"),
            LcdDevice {
                serial: Some("wired1".to_string()),
                source: Some("wired".to_string()),
                ..LcdDevice::default()
            },
            LcdDevice {
                serial: None,
                source: Some("wireless".to_string()),
                ..LcdDevice::default()
            },
        ]);
        let serials = resolve_serials(&[], &driver).await.unwrap();
        assert_eq!(serials, vec!["detected123"]);
    }

    #[tokio::test]
    async fn no_wireless_panel_is_an_error() {
        let driver = FakeDriver::default();
        let err = resolve_serials(&[], &driver).await.unwrap_err();
        assert!(matches!(err, Error::NoPanels));
    }

    #[tokio::test]
    async fn several_wireless_panels_are_ambiguous() {
        let driver = FakeDriver::with_devices(vec![wireless("a"), wireless("b")]);
        let err = resolve_serials(&[], &driver).await.unwrap_err();
        match err {
            Error::AmbiguousPanels(serials) => assert_eq!(serials, vec!["a", "b"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    // ── Real process plumbing against a stand-in script ───────────

    #[cfg(unix)]
    mod vendor_cli {
        use super::*;
        use pretty_assertions::assert_eq;
        use tempfile::TempDir;

        /// Fake `uwscli`: logs its arguments, stores stdin for `send-jpg`,
        /// and fails `brightness` the way a busy USB interface does.
        fn fake_uwscli(dir: &std::path::Path) -> VendorCli {
            let script = dir.join("uwscli.sh");
            let body = format!(
                r#"echo "$@" >> "{log}"
case "$*" in
  *"--serial missing"*) echo "LCD missing not found" >&2; exit 4 ;;
  *"lcd list"*) echo '{{"serial": "abc123", "source": "wireless"}}' ;;
  *"send-jpg"*) cat > "{payload}" ;;
  *"brightness"*) echo "USB interface is busy" >&2; exit 3 ;;
esac
"#,
                log = dir.join("calls.log").display(),
                payload = dir.join("payload.jpg").display(),
            );
            std::fs::write(&script, body).unwrap();
            VendorCli::from_command_line(&format!("sh {}", script.display())).unwrap()
        }

        #[tokio::test]
        async fn send_jpeg_pipes_payload_on_stdin() {
            let tmp = TempDir::new().unwrap();
            let cli = fake_uwscli(tmp.path());

            cli.send_jpeg("abc123", b"\xFF\xD8jpeg\xFF\xD9").await.unwrap();

            let payload = std::fs::read(tmp.path().join("payload.jpg")).unwrap();
            assert_eq!(payload, b"\xFF\xD8jpeg\xFF\xD9");
            let log = std::fs::read_to_string(tmp.path().join("calls.log")).unwrap();
            assert_eq!(log.trim(), "lcd send-jpg --serial abc123 --file -");
        }

        #[tokio::test]
        async fn list_devices_reads_stdout() {
            let tmp = TempDir::new().unwrap();
            let cli = fake_uwscli(tmp.path());

            let devices = cli.list_devices().await.unwrap();
            assert_eq!(devices.len(), 1);
            assert_eq!(devices[0].serial.as_deref(), Some("abc123"));
        }

        #[tokio::test]
        async fn failing_command_surfaces_stderr() {
            let tmp = TempDir::new().unwrap();
            let cli = fake_uwscli(tmp.path());

            let err = cli.set_brightness("abc123", 60).await.unwrap_err();
            match err {
                Error::Device { serial, message } => {
                    assert_eq!(serial, "abc123");
                    assert_eq!(message, "USB interface is busy");
                }
                other => panic!("unexpected error: {other}"),
            }
            let log = std::fs::read_to_string(tmp.path().join("calls.log")).unwrap();
            assert_eq!(log.trim(), "lcd brightness --serial abc123 --value 60");
        }

        #[tokio::test]
        async fn rejected_send_reports_stderr_over_broken_pipe() {
            let tmp = TempDir::new().unwrap();
            let cli = fake_uwscli(tmp.path());
            let jpeg = vec![0xAB; 512 * 1024];

            let err = cli.send_jpeg("missing", &jpeg).await.unwrap_err();
            match err {
                Error::Device { serial, message } => {
                    assert_eq!(serial, "missing");
                    assert_eq!(message, "LCD missing not found");
                }
                other => panic!("unexpected error: {other}"),
            }
        }

        #[tokio::test]
        async fn missing_program_is_a_device_error() {
            let cli = VendorCli::new("/nonexistent/uwscli");
            let err = cli.send_jpeg("abc123", b"x").await.unwrap_err();
            assert!(matches!(err, Error::Device { .. }));
        }
    }
}
