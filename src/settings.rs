use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::config::{
    default_workers, DEFAULT_BATCH_SIZE, DEFAULT_ENCODER_CONCURRENCY, DEFAULT_ENCODER_TIMEOUT_SECS,
    MAX_BLEU_ORDER, MAX_EMBEDDING_DIMENSION,
};
use crate::dataset::mapping::Synonyms;
use crate::dataset::validate::ValidationLimits;
use crate::encoder::EncoderSettings;
use crate::error::MetricsError;
use crate::metrics::ScoringConfig;

/// On-disk tuning knobs. Every field is optional so a partial file only
/// overrides what it names.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PersistentSettings {
    pub scoring: Option<ScoringConfig>,
    pub encoder: Option<EncoderSettings>,
    pub batch_size: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub max_concurrency: Option<usize>,
    pub workers: Option<usize>,
    pub max_rows: Option<usize>,
    pub max_field_chars: Option<usize>,
    pub extra_synonyms: Option<Synonyms>,
}

/// Settings with defaults filled in, as used by the engine.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub scoring: ScoringConfig,
    pub encoder: EncoderSettings,
    pub batch_size: usize,
    pub encoder_timeout: Duration,
    pub max_concurrency: usize,
    pub workers: usize,
    pub limits: ValidationLimits,
    pub synonyms: Synonyms,
}

impl Default for EngineSettings {
    fn default() -> Self {
        PersistentSettings::default().resolve()
    }
}

impl PersistentSettings {
    pub fn resolve(self) -> EngineSettings {
        let defaults = ValidationLimits::default();
        let limits = ValidationLimits {
            max_rows: self.max_rows.filter(|n| *n > 0).unwrap_or(defaults.max_rows),
            max_field_chars: self
                .max_field_chars
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_field_chars),
            max_reported_errors: defaults.max_reported_errors,
        };

        let mut scoring = self.scoring.unwrap_or_default();
        if scoring.bleu.max_order > MAX_BLEU_ORDER {
            warn!(
                "BLEU max order {} exceeds {}; clamping",
                scoring.bleu.max_order, MAX_BLEU_ORDER
            );
            scoring.bleu.max_order = MAX_BLEU_ORDER;
        }

        let mut encoder = self.encoder.unwrap_or_default();
        if let EncoderSettings::Hashing { dimension } = &mut encoder {
            if *dimension > MAX_EMBEDDING_DIMENSION {
                warn!(
                    "Hashing encoder dimension {} exceeds {}; clamping",
                    dimension, MAX_EMBEDDING_DIMENSION
                );
                *dimension = MAX_EMBEDDING_DIMENSION;
            }
        }

        EngineSettings {
            scoring,
            encoder,
            batch_size: self.batch_size.filter(|n| *n > 0).unwrap_or(DEFAULT_BATCH_SIZE),
            encoder_timeout: Duration::from_secs(
                self.timeout_secs
                    .filter(|n| *n > 0)
                    .unwrap_or(DEFAULT_ENCODER_TIMEOUT_SECS),
            ),
            max_concurrency: self
                .max_concurrency
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_ENCODER_CONCURRENCY),
            workers: self.workers.filter(|n| *n > 0).unwrap_or_else(default_workers),
            limits,
            synonyms: match &self.extra_synonyms {
                Some(extra) => Synonyms::with_extra(extra),
                None => Synonyms::default(),
            },
        }
    }
}

impl From<&EngineSettings> for PersistentSettings {
    /// Every knob spelled out, for writing a starting settings file.
    fn from(settings: &EngineSettings) -> Self {
        PersistentSettings {
            scoring: Some(settings.scoring.clone()),
            encoder: Some(settings.encoder.clone()),
            batch_size: Some(settings.batch_size),
            timeout_secs: Some(settings.encoder_timeout.as_secs()),
            max_concurrency: Some(settings.max_concurrency),
            workers: Some(settings.workers),
            max_rows: Some(settings.limits.max_rows),
            max_field_chars: Some(settings.limits.max_field_chars),
            extra_synonyms: None,
        }
    }
}

pub fn load_settings(path: &Path) -> PersistentSettings {
    match std::fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!("Ignoring invalid settings file {:?}: {}", path, e);
            PersistentSettings::default()
        }),
        Err(_) => PersistentSettings::default(),
    }
}

pub fn save_settings(path: &Path, settings: &PersistentSettings) -> Result<(), MetricsError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, json)?;
    Ok(())
}
