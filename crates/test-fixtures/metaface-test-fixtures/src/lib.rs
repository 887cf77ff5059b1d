//! Manifest-driven access to the shared JSON fixtures under `fixtures/`.
//!
//! Loaders return raw JSON text or deserialize into any `DeserializeOwned` type,
//! so this crate stays independent of the crates it serves.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Deserialize;

static MANIFEST: Lazy<Manifest> = Lazy::new(|| {
    let raw = include_str!("../../../../fixtures/manifest.json");
    serde_json::from_str(raw).expect("fixtures manifest should parse")
});

#[derive(Debug, Deserialize)]
struct Manifest {
    phrases: HashMap<String, PhraseEntry>,
    presets: HashMap<String, String>,
    #[serde(rename = "remote-payloads")]
    remote_payloads: HashMap<String, String>,
}

/// A phrase is a timeline, optionally paired with recorded model output in the
/// remote payload format.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PhraseEntry {
    Path(String),
    Detailed {
        timeline: String,
        #[serde(default)]
        raw: Option<String>,
    },
}

impl PhraseEntry {
    fn timeline(&self) -> &str {
        match self {
            PhraseEntry::Path(path) => path,
            PhraseEntry::Detailed { timeline, .. } => timeline,
        }
    }

    fn raw(&self) -> Option<&str> {
        match self {
            PhraseEntry::Path(_) => None,
            PhraseEntry::Detailed { raw, .. } => raw.as_deref(),
        }
    }
}

fn fixtures_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../../fixtures")
}

fn resolve_path(rel: &str) -> PathBuf {
    fixtures_root().join(rel)
}

fn read_to_string(rel: &str) -> Result<String> {
    let path = resolve_path(rel);
    fs::read_to_string(&path)
        .with_context(|| format!("failed to read fixture at {}", path.display()))
}

fn load_json<T: DeserializeOwned>(rel: &str) -> Result<T> {
    let text = read_to_string(rel)?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse JSON fixture {rel}"))
}

fn lookup<'a, T>(map: &'a HashMap<String, T>, kind: &str, name: &str) -> Result<&'a T> {
    map.get(name)
        .ok_or_else(|| anyhow!("unknown {kind} fixture '{name}'"))
}

pub mod phrases {
    use super::*;

    pub fn keys() -> Vec<String> {
        MANIFEST.phrases.keys().cloned().collect()
    }

    pub fn timeline_json(name: &str) -> Result<String> {
        let entry = lookup(&MANIFEST.phrases, "phrase", name)?;
        read_to_string(entry.timeline())
    }

    pub fn timeline<T: DeserializeOwned>(name: &str) -> Result<T> {
        let entry = lookup(&MANIFEST.phrases, "phrase", name)?;
        super::load_json(entry.timeline())
    }

    /// Recorded raw model output for the phrase, if the manifest lists one.
    pub fn raw_json(name: &str) -> Result<Option<String>> {
        let entry = lookup(&MANIFEST.phrases, "phrase", name)?;
        match entry.raw() {
            Some(rel) => read_to_string(rel).map(Some),
            None => Ok(None),
        }
    }

    pub fn timeline_path(name: &str) -> Result<PathBuf> {
        let entry = lookup(&MANIFEST.phrases, "phrase", name)?;
        Ok(resolve_path(entry.timeline()))
    }
}

pub mod presets {
    use super::*;

    pub fn keys() -> Vec<String> {
        MANIFEST.presets.keys().cloned().collect()
    }

    pub fn json(name: &str) -> Result<String> {
        let rel = lookup(&MANIFEST.presets, "preset", name)?;
        read_to_string(rel)
    }

    pub fn load<T: DeserializeOwned>(name: &str) -> Result<T> {
        let rel = lookup(&MANIFEST.presets, "preset", name)?;
        super::load_json(rel)
    }
}

pub mod remote_payloads {
    use super::*;

    pub fn keys() -> Vec<String> {
        MANIFEST.remote_payloads.keys().cloned().collect()
    }

    pub fn json(name: &str) -> Result<String> {
        let rel = lookup(&MANIFEST.remote_payloads, "remote payload", name)?;
        read_to_string(rel)
    }

    pub fn path(name: &str) -> Result<PathBuf> {
        let rel = lookup(&MANIFEST.remote_payloads, "remote payload", name)?;
        Ok(resolve_path(rel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_manifest_entry_resolves() {
        for name in phrases::keys() {
            phrases::timeline_json(&name).unwrap();
            phrases::raw_json(&name).unwrap();
        }
        for name in presets::keys() {
            presets::json(&name).unwrap();
        }
        for name in remote_payloads::keys() {
            assert!(remote_payloads::path(&name).unwrap().exists());
        }
    }

    #[test]
    fn unknown_fixture_is_an_error() {
        let err = presets::json("does-not-exist").unwrap_err();
        assert!(err.to_string().contains("unknown preset fixture"));
    }
}
