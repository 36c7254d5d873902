//! Installed-versus-advertised version comparison and notice rendering.

use anyhow::{Context, Result};
use colored::Colorize;
use semver::Version;
use std::io::Write;
use tracing::debug;

use crate::core::ToolupError;
use crate::upgrade::descriptor::UpdateDescriptor;

/// Outcome of [`VersionGate::evaluate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// The installed version is the advertised one or newer.
    UpToDate,
    /// The descriptor advertises a strictly newer version.
    UpgradeAvailable(Version),
}

impl GateDecision {
    #[must_use]
    pub fn is_upgrade(&self) -> bool {
        matches!(self, Self::UpgradeAvailable(_))
    }
}

/// How remote notices are rendered.
///
/// With ANSI support a notice is a yellow line prefixed with a warning icon;
/// without it the text is upper-cased so it still stands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoticeStyle {
    pub colorize: bool,
}

impl NoticeStyle {
    pub const fn new(colorize: bool) -> Self {
        Self {
            colorize,
        }
    }

    #[must_use]
    pub fn render(&self, notice: &str) -> String {
        if self.colorize {
            format!("⚠ {}", notice.yellow())
        } else {
            notice.to_uppercase()
        }
    }
}

/// Parse a version string, tolerating a leading `v`.
pub fn parse_version(value: &str) -> Result<Version> {
    let trimmed = value.trim();
    let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);
    Version::parse(trimmed).with_context(|| format!("Invalid version '{value}'"))
}

/// Decides whether the advertised version warrants an upgrade.
pub struct VersionGate {
    installed: Version,
}

impl VersionGate {
    pub fn new(installed: &str) -> Result<Self> {
        Ok(Self {
            installed: parse_version(installed)?,
        })
    }

    /// Compare against `descriptor`, writing notices to `out`.
    ///
    /// General notices are written before the comparison regardless of its
    /// result, so they also appear when the advertised version fails to parse.
    /// Version notices are written only when an upgrade is found, framed by
    /// blank lines.
    pub fn evaluate<W: Write>(
        &self,
        descriptor: &UpdateDescriptor,
        style: &NoticeStyle,
        out: &mut W,
    ) -> Result<GateDecision> {
        for notice in &descriptor.general_warnings {
            writeln!(out, "{}", style.render(notice))?;
        }

        let target = parse_version(&descriptor.version).map_err(|e| ToolupError::ParseError {
            subject: "descriptor version".to_string(),
            reason: format!("{e:#}"),
        })?;
        debug!("Installed {}, advertised {}", self.installed, target);

        if target <= self.installed {
            return Ok(GateDecision::UpToDate);
        }

        if !descriptor.version_warnings.is_empty() {
            writeln!(out)?;
            for notice in &descriptor.version_warnings {
                writeln!(out, "{}", style.render(notice))?;
            }
            writeln!(out)?;
        }

        Ok(GateDecision::UpgradeAvailable(target))
    }
}
