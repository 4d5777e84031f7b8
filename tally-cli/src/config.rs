use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tally_ingest::{ClassifierConfig, OcrConfig};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub ocr: OcrSection,
    pub classifier: ClassifierConfig,
    pub batch: BatchSection,
    pub output: OutputSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSection {
    pub enabled: bool,
    pub languages: String,
    pub dpi: u32,
    pub pdftoppm: String,
    pub tesseract: String,
}

impl Default for OcrSection {
    fn default() -> Self {
        let tools = OcrConfig::default();
        Self {
            enabled: true,
            languages: tools.languages,
            dpi: tools.dpi,
            pdftoppm: tools.pdftoppm,
            tesseract: tools.tesseract,
        }
    }
}

impl OcrSection {
    pub fn tools(&self) -> OcrConfig {
        OcrConfig {
            languages: self.languages.clone(),
            dpi: self.dpi,
            pdftoppm: self.pdftoppm.clone(),
            tesseract: self.tesseract.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSection {
    /// Files processed at once; each may run OCR.
    pub workers: usize,
    /// Descend into subfolders when the input is a folder.
    pub recursive: bool,
}

impl Default for BatchSection {
    fn default() -> Self {
        Self {
            workers: 2,
            recursive: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSection {
    pub dir: Option<PathBuf>,
}

pub fn tally_home() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".tally"))
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(tally_home()?.join("config.toml"))
}

fn resolve(path: Option<&Path>) -> Result<PathBuf> {
    match path {
        Some(p) => Ok(p.to_path_buf()),
        None => default_config_path(),
    }
}

pub fn parse_config(s: &str) -> Result<Config> {
    toml::from_str(s).context("parse config.toml")
}

/// Defaults when the file does not exist; a file that exists but does not parse is an error.
pub fn load_config(path: Option<&Path>) -> Result<(Config, PathBuf)> {
    let p = resolve(path)?;
    if !p.exists() {
        return Ok((Config::default(), p));
    }
    let s = fs::read_to_string(&p).with_context(|| format!("read {}", p.display()))?;
    let cfg = parse_config(&s).with_context(|| format!("load {}", p.display()))?;
    Ok((cfg, p))
}

pub fn render_config(cfg: &Config) -> Result<String> {
    toml::to_string_pretty(cfg).context("serialize config")
}

pub fn init_config(path: Option<&Path>) -> Result<()> {
    let p = resolve(path)?;
    if p.exists() {
        println!("Config already exists: {}", p.display());
        return Ok(());
    }
    if let Some(dir) = p.parent() {
        fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
    }
    fs::write(&p, render_config(&Config::default())?).with_context(|| format!("write {}", p.display()))?;
    println!("Wrote {}", p.display());
    Ok(())
}
