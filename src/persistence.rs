//! JSON persistence for signals, principles, and axioms.
//!
//! Each collection is one pretty-printed JSON array on disk. The strict
//! loaders surface unreadable state as `Corruption`; the forgiving
//! loaders downgrade that to a warning and an empty collection, so a
//! damaged store never blocks a fresh synthesis pass.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{info, warn};

use crate::error::SynthesisError;
use crate::types::{Axiom, Principle, Signal};

fn save_collection<T: Serialize>(path: &Path, items: &[T], what: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let json = serde_json::to_string_pretty(items)
        .with_context(|| format!("Failed to serialize {}", what))?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write {} to {}", what, path.display()))?;

    info!("Saved {} {} to {}", items.len(), what, path.display());
    Ok(())
}

/// Strict load: a missing file is an empty collection, but unreadable or
/// unparseable state is reported as `Corruption`.
fn try_load_collection<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, SynthesisError> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = std::fs::read_to_string(path).map_err(|e| SynthesisError::Corruption {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    serde_json::from_str(&content).map_err(|e| SynthesisError::Corruption {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Forgiving load: corrupt state degrades to empty with a warning.
fn load_collection<T: DeserializeOwned>(path: &Path, what: &str) -> Vec<T> {
    match try_load_collection(path) {
        Ok(items) => items,
        Err(e) => {
            warn!("Could not load {}, starting empty: {}", what, e);
            Vec::new()
        }
    }
}

pub fn save_signals(path: &Path, signals: &[Signal]) -> Result<()> {
    save_collection(path, signals, "signals")
}

pub fn load_signals(path: &Path) -> Vec<Signal> {
    load_collection(path, "signals")
}

pub fn save_principles(path: &Path, principles: &[Principle]) -> Result<()> {
    save_collection(path, principles, "principles")
}

pub fn try_load_principles(path: &Path) -> Result<Vec<Principle>, SynthesisError> {
    try_load_collection(path)
}

pub fn load_principles(path: &Path) -> Vec<Principle> {
    load_collection(path, "principles")
}

pub fn save_axioms(path: &Path, axioms: &[Axiom]) -> Result<()> {
    save_collection(path, axioms, "axioms")
}

pub fn load_axioms(path: &Path) -> Vec<Axiom> {
    load_collection(path, "axioms")
}
