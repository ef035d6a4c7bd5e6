//! Environment-sourced configuration, read once at startup.

use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Default working directory for shell and code execution.
    pub workspace: PathBuf,
    /// X11 display the desktop tools and the recorder target, e.g. ":99".
    pub display: String,
    /// Chrome remote-debugging port.
    pub cdp_port: u16,
    pub browser_executable: Option<String>,
    pub browser_viewport_width: u32,
    pub browser_viewport_height: u32,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            workspace: env::var("WORKSPACE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/home/sandbox/workspace")),
            display: env::var("DISPLAY").unwrap_or_else(|_| ":99".into()),
            cdp_port: env::var("CDP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(9222),
            browser_executable: env::var("BROWSER_EXECUTABLE").ok(),
            browser_viewport_width: env::var("BROWSER_VIEWPORT_WIDTH")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(1280),
            browser_viewport_height: env::var("BROWSER_VIEWPORT_HEIGHT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(720),
        }
    }

    pub fn cdp_url(&self) -> String {
        format!("http://localhost:{}", self.cdp_port)
    }
}
