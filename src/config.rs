use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

use crate::docx::LoadOptions;
use crate::render::{RenderOptions, DEFAULT_BULLET};

pub const CONFIG_FILENAME: &str = "docx-templater.toml";
pub const CONFIG_ENV: &str = "DOCX_TEMPLATER_CONFIG";
pub const DEFAULT_MAX_FILE_SIZE_MB: u64 = 20;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub limits: LimitsSection,
    #[serde(default)]
    pub render: RenderSection,
    #[serde(default)]
    pub images: ImagesSection,
    #[serde(default)]
    pub batch: BatchSection,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct LimitsSection {
    /// Templates larger than this are rejected before parsing. 0 disables the check.
    #[serde(default)]
    pub max_file_size_mb: Option<u64>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct RenderSection {
    #[serde(default)]
    pub strict: Option<bool>,
    #[serde(default)]
    pub preserve_format: Option<bool>,
    #[serde(default)]
    pub bullet: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct ImagesSection {
    /// Directory scanned for `<key>.<ext>` replacement images.
    /// Relative paths resolve against the config file's directory.
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct BatchSection {
    #[serde(default)]
    pub workers: Option<usize>,
}

impl AppConfig {
    pub fn max_file_size_bytes(&self) -> Option<u64> {
        match self.limits.max_file_size_mb.unwrap_or(DEFAULT_MAX_FILE_SIZE_MB) {
            0 => None,
            mb => Some(mb.saturating_mul(1024 * 1024)),
        }
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            strict: self.render.strict.unwrap_or(false),
            preserve_format: self.render.preserve_format.unwrap_or(true),
            bullet: self
                .render
                .bullet
                .clone()
                .unwrap_or_else(|| DEFAULT_BULLET.to_string()),
            load: LoadOptions {
                max_file_size: self.max_file_size_bytes(),
            },
        }
    }

    /// The image directory with relative paths resolved against `config_path`.
    pub fn images_dir(&self, config_path: Option<&Path>) -> Option<PathBuf> {
        let dir = self.images.dir.clone()?;
        if dir.is_relative() {
            if let Some(base) = config_path.and_then(Path::parent) {
                return Some(base.join(dir));
            }
        }
        Some(dir)
    }
}

pub fn find_file_upwards(start_dir: &Path, filename: &str, max_levels: usize) -> Option<PathBuf> {
    let mut dir = start_dir;
    for _ in 0..=max_levels {
        let candidate = dir.join(filename);
        if candidate.exists() {
            return Some(candidate);
        }
        dir = dir.parent()?;
    }
    None
}

pub fn find_default_config(workdir: &Path, filename: &str) -> Option<PathBuf> {
    if let Ok(cwd) = std::env::current_dir() {
        if let Some(p) = find_file_upwards(&cwd, filename, 8) {
            return Some(p);
        }
    }
    find_file_upwards(workdir, filename, 8)
}

/// `--config`, then `$DOCX_TEMPLATER_CONFIG`, then an upward search from the
/// current directory and from `workdir`.
pub fn locate_config(explicit: Option<PathBuf>, workdir: &Path) -> Option<PathBuf> {
    explicit
        .or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from))
        .or_else(|| find_default_config(workdir, CONFIG_FILENAME))
}

pub fn load_config(path: &Path) -> anyhow::Result<AppConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read config: {}", path.display()))?;
    let cfg: AppConfig = toml::from_str(&text).context("parse config toml")?;
    Ok(cfg)
}

/// Load the located config, or defaults when none exists.
pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    match path {
        Some(p) if p.exists() => load_config(p),
        _ => Ok(AppConfig::default()),
    }
}

pub const DEFAULT_CONFIG_TOML: &str = r#"[limits]
# Templates above this size are rejected before parsing (0 = no limit).
max_file_size_mb = 20

[render]
# Fail when the document has placeholders the data does not cover.
strict = false
# Edit run text in place instead of rewriting whole paragraphs.
preserve_format = true
bullet = "• "

[images]
# Directory of replacement images named by key: body_0.png, header_0_0.jpg, ...
# dir = "images"

[batch]
# Worker threads for --batch-dir (default: one per CPU).
# workers = 4
"#;

pub fn init_default_config(dir: &Path, force: bool) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create config dir: {}", dir.display()))?;
    let cfg_path = dir.join(CONFIG_FILENAME);
    if cfg_path.exists() && !force {
        return Ok(cfg_path);
    }
    std::fs::write(&cfg_path, DEFAULT_CONFIG_TOML)
        .with_context(|| format!("write config: {}", cfg_path.display()))?;
    Ok(cfg_path)
}
