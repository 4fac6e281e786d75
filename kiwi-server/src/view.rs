//! Page rendering

use std::fmt::Write;

use kiwi_core::{Device, DeviceCommand};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ViewError {
    #[error("Failed to render page: {0}")]
    Format(#[from] std::fmt::Error),
}

/// Everything the home page shows
#[derive(Debug, Default)]
pub struct HomeView<'a> {
    pub username: &'a str,
    pub error_messages: &'a [String],
    pub notification_messages: &'a [String],
    /// Username from a rejected sign-in form, to prefill the field
    pub remembered_username: Option<String>,
}

pub trait ViewRenderer: Send + Sync {
    fn render_home(&self, view: &HomeView<'_>) -> Result<String, ViewError>;
}

/// Builds HTML in-process
pub struct HtmlView {
    public_prefix: String,
}

impl HtmlView {
    pub fn new(public_prefix: &str) -> Self {
        Self {
            public_prefix: public_prefix.trim_end_matches('/').to_string(),
        }
    }
}

impl ViewRenderer for HtmlView {
    fn render_home(&self, view: &HomeView<'_>) -> Result<String, ViewError> {
        let mut html = String::new();

        writeln!(html, "<!DOCTYPE html>")?;
        writeln!(html, "<html><head><meta charset=\"utf-8\"><title>kiwi</title>")?;
        writeln!(
            html,
            "<link rel=\"stylesheet\" href=\"{}/style.css\"></head><body>",
            escape(&self.public_prefix)
        )?;

        for message in view.error_messages {
            writeln!(html, "<div class=\"flash error\">{}</div>", escape(message))?;
        }
        for message in view.notification_messages {
            writeln!(html, "<pre class=\"flash notification\">{}</pre>", escape(message))?;
        }

        if view.username.is_empty() {
            let username = view.remembered_username.as_deref().unwrap_or("");
            writeln!(html, "<form method=\"post\" action=\"/signin\">")?;
            writeln!(
                html,
                "<input name=\"Username\" placeholder=\"Username\" value=\"{}\">",
                escape(username)
            )?;
            writeln!(html, "<input name=\"Password\" type=\"password\" placeholder=\"Password\">")?;
            writeln!(html, "<label><input name=\"Remember\" type=\"checkbox\"> Remember me</label>")?;
            writeln!(html, "<button type=\"submit\">Sign in</button>")?;
            writeln!(html, "</form>")?;
        } else {
            writeln!(
                html,
                "<p>Signed in as <b>{}</b> - <a href=\"/signout\">Sign out</a></p>",
                escape(view.username)
            )?;
            for device in [Device::Tv, Device::Toshiba] {
                writeln!(html, "<h2>{}</h2><ul>", device.name())?;
                for command in DeviceCommand::all().iter().filter(|c| c.device() == device) {
                    writeln!(
                        html,
                        "<li><a href=\"/{}/{}\">{}</a></li>",
                        device.name(),
                        command.name(),
                        command.name()
                    )?;
                }
                writeln!(html, "</ul>")?;
            }
        }

        writeln!(html, "</body></html>")?;
        Ok(html)
    }
}

/// Escape text for HTML bodies and quoted attributes
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
