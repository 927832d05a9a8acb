use crate::{OsError, OsResult};
use tokio::process::Command;

pub(crate) async fn command_exists(command: &str) -> bool {
    Command::new("which")
        .arg(command)
        .output()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}

pub(crate) async fn run_checked(command: &str, args: &[&str]) -> OsResult<()> {
    run_bytes(command, args).await.map(|_| ())
}

pub(crate) async fn run_output(command: &str, args: &[&str]) -> OsResult<String> {
    let stdout = run_bytes(command, args).await?;
    Ok(String::from_utf8_lossy(&stdout).to_string())
}

pub(crate) async fn run_bytes(command: &str, args: &[&str]) -> OsResult<Vec<u8>> {
    let output = Command::new(command).args(args).output().await?;
    if output.status.success() {
        return Ok(output.stdout);
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    if stderr.to_lowercase().contains("permission denied") {
        return Err(OsError::PermissionDenied(format!("{command}: {stderr}")));
    }
    Err(OsError::OperationFailed(format!("{command}: {stderr}")))
}
