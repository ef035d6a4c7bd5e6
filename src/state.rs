//! Shared application state: config plus the two session singletons.

use std::sync::Arc;
use std::time::Instant;

use crate::browser::{BrowserSession, BrowserSettings};
use crate::config::Config;
use crate::recorder::ScreenRecorder;

pub struct AppState {
    pub config: Config,
    pub start_time: Instant,
    pub browser: BrowserSession,
    pub recorder: ScreenRecorder,
}

impl AppState {
    pub fn new(config: Config) -> Arc<Self> {
        let browser = BrowserSession::new(BrowserSettings {
            cdp_port: config.cdp_port,
            executable: config.browser_executable.clone(),
            viewport_width: config.browser_viewport_width,
            viewport_height: config.browser_viewport_height,
        });
        let recorder = ScreenRecorder::new(config.display.clone());

        Arc::new(Self {
            config,
            start_time: Instant::now(),
            browser,
            recorder,
        })
    }

    pub fn uptime_secs(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }
}
