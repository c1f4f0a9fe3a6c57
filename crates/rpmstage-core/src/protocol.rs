use std::io::Write;

use anyhow::{Context, Result};

pub fn render_prep_line() -> String {
    "PROGRESS_PREP:".to_string()
}

pub fn render_install_line(message: &str) -> String {
    format!("PROGRESS_INSTALL: {message}")
}

pub fn render_percent_line(completed: u64, total: u64) -> String {
    let percent = if total == 0 {
        100.0
    } else {
        100.0 * completed as f64 / total as f64
    };
    format!("PERCENT: {percent:.1}")
}

pub fn render_post_line() -> String {
    "PROGRESS_POST:".to_string()
}

pub fn render_info_line(message: &str) -> String {
    format!("INFO: {message}")
}

pub fn render_debug_line(message: &str) -> String {
    format!("DEBUG: {message}")
}

pub fn render_warn_line(message: &str) -> String {
    format!("WARN: {message}")
}

pub fn render_error_line(message: &str) -> String {
    format!("ERROR: {message}")
}

pub fn render_quit_line() -> String {
    "QUIT:".to_string()
}

pub struct ProgressEmitter<W: Write> {
    sink: W,
    debug_enabled: bool,
}

impl<W: Write> ProgressEmitter<W> {
    pub fn new(sink: W, debug_enabled: bool) -> Self {
        Self {
            sink,
            debug_enabled,
        }
    }

    pub fn prep(&mut self) -> Result<()> {
        self.emit(&render_prep_line())
    }

    pub fn install_status(&mut self, message: &str) -> Result<()> {
        self.emit(&render_install_line(message))
    }

    pub fn percent(&mut self, completed: u64, total: u64) -> Result<()> {
        self.emit(&render_percent_line(completed, total))
    }

    pub fn post(&mut self) -> Result<()> {
        self.emit(&render_post_line())
    }

    pub fn info(&mut self, message: &str) -> Result<()> {
        self.emit(&render_info_line(message))
    }

    pub fn debug(&mut self, message: &str) -> Result<()> {
        if !self.debug_enabled {
            return Ok(());
        }
        self.emit(&render_debug_line(message))
    }

    pub fn warn(&mut self, message: &str) -> Result<()> {
        self.emit(&render_warn_line(message))
    }

    pub fn error(&mut self, message: &str) -> Result<()> {
        self.emit(&render_error_line(message))
    }

    pub fn quit(&mut self) -> Result<()> {
        self.emit(&render_quit_line())
    }

    pub fn into_sink(self) -> W {
        self.sink
    }

    fn emit(&mut self, line: &str) -> Result<()> {
        writeln!(self.sink, "{line}").context("failed writing progress line")?;
        self.sink
            .flush()
            .context("failed flushing progress line")
    }
}
