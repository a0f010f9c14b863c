// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Environment variable overriding the config path passed in code.
pub const CONFIG_ENV: &str = "SSH_TRANSPORT_CONFIG";

/// Resolve a config path: an absolute path is taken as-is, a relative
/// one is anchored at the working directory, and `SSH_TRANSPORT_CONFIG`
/// overrides both.
pub fn resolve_config_path(rel: &str) -> Result<PathBuf> {
    let chosen = std::env::var(CONFIG_ENV).unwrap_or_else(|_| rel.to_string());
    let p = Path::new(&chosen);

    let abs = if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()
            .context("cannot get current working dir")?
            .join(p)
    };

    abs.canonicalize()
        .with_context(|| format!("failed to canonicalize path {abs:?}"))
}
