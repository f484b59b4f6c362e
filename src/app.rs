use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::backend::{DirectClient, DispatchError, ProxyClient, Route};
use crate::config::{Config, DEFAULT_BACKEND_URL, DEFAULT_PROXY_URL, DEFAULT_TIMEOUT_SECS};
use crate::history;
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,

    // Conversation
    pub session: Session,

    // Input buffer
    pub input: String,
    pub cursor: usize, // cursor position in input, in chars

    // Chat viewport
    pub chat_scroll: u16,
    pub chat_height: u16, // inner height of chat area, set during render
    pub chat_width: u16,  // inner width of chat area, for wrap calculations

    // Overlays
    pub show_about: bool,
    pub show_help: bool,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Dispatch
    pub route: Route,
    pub backend_url: String,
    direct: DirectClient,
    proxy: ProxyClient,
    dispatch_task: Option<JoinHandle<Result<String, DispatchError>>>,
}

impl App {
    pub fn new(config: &Config) -> Result<Self> {
        // Env vars win over the config file
        let backend_url = std::env::var("UNID3_BACKEND_URL")
            .ok()
            .or_else(|| config.backend_url.clone())
            .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string());
        let proxy_url = std::env::var("UNID3_PROXY_URL")
            .ok()
            .or_else(|| config.proxy_url.clone())
            .unwrap_or_else(|| DEFAULT_PROXY_URL.to_string());

        let route = match config.route.as_deref() {
            None => Route::default(),
            Some(s) => Route::from_str(s).unwrap_or_else(|| {
                warn!(route = s, "unknown route in config, using direct");
                Route::default()
            }),
        };

        let timeout =
            Duration::from_secs(config.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS));

        let direct = DirectClient::new(&backend_url, timeout)?;
        let proxy = ProxyClient::new(&proxy_url, timeout)?;

        Ok(Self {
            should_quit: false,
            input_mode: InputMode::Editing,

            session: Session::new(),

            input: String::new(),
            cursor: 0,

            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,

            show_about: false,
            show_help: false,

            animation_frame: 0,

            route,
            backend_url,
            direct,
            proxy,
            dispatch_task: None,
        })
    }

    pub fn is_busy(&self) -> bool {
        self.session.is_busy()
    }

    /// Submit the input buffer. The session guard rejects blank input and a
    /// submit while a dispatch is outstanding; on acceptance the user turn
    /// is already in the transcript before the request leaves.
    pub fn submit_query(&mut self) {
        let Some(text) = self.session.submit(&self.input) else {
            return;
        };
        self.input.clear();
        self.cursor = 0;

        // The history accompanying the request is the turns *before* the
        // one just appended; the message field carries the new text.
        let messages = self.session.messages();
        let turns = history::window(&messages[..messages.len() - 1]);

        self.scroll_to_latest();

        info!(route = self.route.as_str(), chars = text.len(), "dispatching query");

        let task = match self.route {
            Route::Direct => {
                let client = self.direct.clone();
                tokio::spawn(async move { client.send(&text, &turns).await })
            }
            Route::Proxy => {
                let client = self.proxy.clone();
                tokio::spawn(async move { client.send(&text).await })
            }
        };
        self.dispatch_task = Some(task);
    }

    /// Fold a settled dispatch back into the transcript. No-op while the
    /// call is still in flight; there is no cancellation path.
    pub async fn poll_dispatch(&mut self) {
        let finished = self
            .dispatch_task
            .as_ref()
            .map(|task| task.is_finished())
            .unwrap_or(false);
        if !finished {
            return;
        }

        if let Some(task) = self.dispatch_task.take() {
            let outcome = match task.await {
                Ok(result) => result,
                Err(join_err) => Err(DispatchError::Transport(join_err.to_string())),
            };
            match &outcome {
                Ok(answer) => info!(chars = answer.len(), "answer received"),
                Err(err) => warn!(error = %err, "dispatch failed"),
            }
            self.session.resolve(outcome);
            self.scroll_to_latest();
        }
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.is_busy() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn scroll_up(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_sub(1);
    }

    pub fn scroll_down(&mut self) {
        let max_scroll = self.max_scroll();
        self.chat_scroll = self.chat_scroll.saturating_add(1).min(max_scroll);
    }

    pub fn scroll_half_page_down(&mut self) {
        let half_page = self.chat_height / 2;
        self.chat_scroll = (self.chat_scroll + half_page).min(self.max_scroll());
    }

    pub fn scroll_half_page_up(&mut self) {
        let half_page = self.chat_height / 2;
        self.chat_scroll = self.chat_scroll.saturating_sub(half_page);
    }

    /// Scroll the transcript so the newest turn (or the thinking indicator)
    /// is visible.
    pub fn scroll_to_latest(&mut self) {
        self.chat_scroll = self.max_scroll();
    }

    fn max_scroll(&self) -> u16 {
        let visible_height = if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        };
        self.transcript_lines().saturating_sub(visible_height)
    }

    /// Rendered height of the transcript. Mirrors the renderer's layout:
    /// one label line per turn, wrapped content, one blank separator.
    fn transcript_lines(&self) -> u16 {
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total_lines: u16 = 0;

        for msg in self.session.messages() {
            total_lines += 1; // label + timestamp line
            for line in msg.content.lines() {
                // Character count, not byte length, for UTF-8 content
                let char_count = line.chars().count();
                if char_count == 0 {
                    total_lines += 1;
                } else {
                    total_lines += ((char_count / wrap_width) + 1) as u16;
                }
            }
            total_lines += 1; // blank line after message
        }

        if self.is_busy() {
            total_lines += 2; // label + "Thinking..."
        }

        total_lines
    }
}
