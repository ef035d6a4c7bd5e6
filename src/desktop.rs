//! Virtual-desktop control via external X11 tools (scrot, xdotool).

use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use crate::error::{ApiError, Result};

/// Desktop tools are quick; anything slower than this is stuck.
const TOOL_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}

impl MouseButton {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "left" => Ok(Self::Left),
            "middle" => Ok(Self::Middle),
            "right" => Ok(Self::Right),
            other => Err(ApiError::InvalidArgument(format!(
                "unknown mouse button: {other}"
            ))),
        }
    }

    fn xdotool_arg(self) -> &'static str {
        match self {
            Self::Left => "1",
            Self::Middle => "2",
            Self::Right => "3",
        }
    }
}

/// Capture the whole display as PNG bytes.
pub async fn screenshot(display: &str) -> Result<Vec<u8>> {
    let shot = tempfile::Builder::new()
        .prefix("sandboxd-shot-")
        .suffix(".png")
        .tempfile()?;
    run_tool(
        display,
        "scrot",
        &["-o", &shot.path().display().to_string()],
    )
    .await?;
    let bytes = tokio::fs::read(shot.path()).await?;
    Ok(bytes)
}

pub async fn mouse(display: &str, action: &str, x: i32, y: i32, button: MouseButton) -> Result<()> {
    let x = x.to_string();
    let y = y.to_string();
    let button = button.xdotool_arg();
    let args: Vec<&str> = match action {
        "move" => vec!["mousemove", &x, &y],
        "click" => vec!["mousemove", &x, &y, "click", button],
        "double_click" => vec!["mousemove", &x, &y, "click", "--repeat", "2", button],
        other => {
            return Err(ApiError::InvalidArgument(format!(
                "unknown mouse action: {other}"
            )))
        }
    };
    run_tool(display, "xdotool", &args).await
}

pub async fn keyboard(
    display: &str,
    text: Option<&str>,
    key: Option<&str>,
    modifiers: &[String],
) -> Result<()> {
    match (text, key) {
        (Some(text), _) => run_tool(display, "xdotool", &["type", "--", text]).await,
        (None, Some(key)) => {
            let combo = if modifiers.is_empty() {
                key.to_string()
            } else {
                format!("{}+{}", modifiers.join("+"), key)
            };
            run_tool(display, "xdotool", &["key", &combo]).await
        }
        (None, None) => Err(ApiError::InvalidArgument("provide text or key".into())),
    }
}

async fn run_tool(display: &str, program: &str, args: &[&str]) -> Result<()> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .env("DISPLAY", display)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let status = tokio::time::timeout(TOOL_TIMEOUT, async {
        cmd.spawn().map_err(ApiError::Spawn)?.wait().await.map_err(ApiError::Io)
    })
    .await
    .map_err(|_| ApiError::Timeout(TOOL_TIMEOUT.as_secs()))??;

    if status.success() {
        Ok(())
    } else {
        Err(ApiError::Internal(format!(
            "{program} exited with {status}"
        )))
    }
}
