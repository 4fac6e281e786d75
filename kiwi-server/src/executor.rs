//! External programs behind device commands
//!
//! TV commands are single lines piped into `cec-client`; the laptop is woken
//! with `wakeonlan <mac>`. Programs run without any shared lock held and
//! are killed when they exceed the configured timeout.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use kiwi_core::config::DevicesConfig;
use kiwi_core::{CommandExecutor, DeviceCommand, ExecutorError};

pub struct SystemExecutor {
    cec_client: String,
    cec_args: Vec<String>,
    wakeonlan: String,
    toshiba_mac: String,
    timeout: Duration,
}

impl SystemExecutor {
    pub fn from_config(config: &DevicesConfig) -> Self {
        Self {
            cec_client: config.cec_client.clone(),
            cec_args: config.cec_args.clone(),
            wakeonlan: config.wakeonlan.clone(),
            toshiba_mac: config.toshiba_mac.clone(),
            timeout: Duration::from_secs(config.command_timeout_secs),
        }
    }
}

#[async_trait]
impl CommandExecutor for SystemExecutor {
    async fn execute(&self, command: DeviceCommand) -> Result<String, ExecutorError> {
        let (program, args, input) = match command.cec_line() {
            Some(line) => (&self.cec_client, self.cec_args.clone(), Some(line)),
            None => (&self.wakeonlan, vec![self.toshiba_mac.clone()], None),
        };

        tracing::info!("Running {} for {}/{}", program, command.device().name(), command.name());
        let result = run_program(command.name(), program, &args, input, self.timeout).await;

        if let Err(e) = &result {
            tracing::warn!("Device command failed: {}", e);
        }
        result
    }
}

/// Run `program`, optionally feeding `input` on stdin, and capture stdout
async fn run_program(
    name: &'static str,
    program: &str,
    args: &[String],
    input: Option<&str>,
    timeout: Duration,
) -> Result<String, ExecutorError> {
    let failed = |output: String, reason: String| ExecutorError::CommandFailed {
        command: name,
        output,
        reason,
    };

    let mut child = Command::new(program)
        .args(args)
        .stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| failed(String::new(), format!("could not start {}: {}", program, e)))?;

    if let (Some(input), Some(mut stdin)) = (input, child.stdin.take()) {
        stdin
            .write_all(input.as_bytes())
            .await
            .map_err(|e| failed(String::new(), format!("could not write to {}: {}", program, e)))?;
        // Closing stdin lets single-command programs exit
        drop(stdin);
    }

    let Some(mut stdout) = child.stdout.take() else {
        return Err(failed(String::new(), format!("no stdout from {}", program)));
    };

    // Chunks land in `captured` as they arrive, so a timeout keeps them
    let mut captured = Vec::new();
    let run = async {
        let mut chunk = [0u8; 4096];
        loop {
            let n = stdout.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            captured.extend_from_slice(&chunk[..n]);
        }
        child.wait().await
    };
    let result = tokio::time::timeout(timeout, run).await;

    let output = String::from_utf8_lossy(&captured).into_owned();
    match result {
        Ok(Ok(status)) if status.success() => Ok(output),
        Ok(Ok(status)) => Err(failed(output, status.to_string())),
        Ok(Err(e)) => Err(failed(output, e.to_string())),
        Err(_) => {
            if let Err(e) = child.start_kill() {
                tracing::warn!("Failed to kill {}: {}", program, e);
            }
            Err(failed(output, format!("timed out after {:?}", timeout)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_stdin_is_forwarded() {
        let out = run_program("powerstatus", "sh", &sh("cat"), Some("pow 0"), Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out, "pow 0");
    }

    #[tokio::test]
    async fn test_failure_keeps_partial_output() {
        let err = run_program("poweron", "sh", &sh("echo partial; exit 3"), None, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err.output(), "partial\n");
        assert!(err.to_string().starts_with("poweron failed"));
    }

    #[tokio::test]
    async fn test_missing_program() {
        let err = run_program("wol", "kiwi-no-such-program", &[], None, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(err.output().is_empty());
        assert!(err.to_string().contains("could not start"));
    }

    #[tokio::test]
    async fn test_hung_program_times_out() {
        let err = run_program("hdmi1", "sh", &sh("sleep 5"), None, Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_timeout_keeps_partial_output() {
        let script = sh("echo 'opening a connection to the CEC adapter...'; sleep 5");
        let err = run_program("powerstatus", "sh", &script, None, Duration::from_millis(300))
            .await
            .unwrap_err();

        assert_eq!(err.output(), "opening a connection to the CEC adapter...\n");
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_wake_on_lan_passes_mac() {
        let config = DevicesConfig {
            wakeonlan: "echo".to_string(),
            toshiba_mac: "AA:BB:CC:DD:EE:FF".to_string(),
            ..Default::default()
        };
        let out = SystemExecutor::from_config(&config)
            .execute(DeviceCommand::WakeOnLan)
            .await
            .unwrap();
        assert_eq!(out, "AA:BB:CC:DD:EE:FF\n");
    }
}
