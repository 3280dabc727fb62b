use shared::SearchSettings;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SettingsError {
    #[error("Max results must be at least 1")]
    MaxResultsTooSmall,
    #[error("Color radius must be between 0 and 255, got {0}")]
    ColorRadiusOutOfRange(u32),
    #[error("{field} must be within [0, 1], got {value}")]
    SimilarityOutOfRange { field: &'static str, value: f64 },
}

pub fn validate(settings: &SearchSettings) -> Result<(), SettingsError> {
    if settings.max_results == 0 {
        return Err(SettingsError::MaxResultsTooSmall);
    }
    if settings.color_radius > 255 {
        return Err(SettingsError::ColorRadiusOutOfRange(settings.color_radius));
    }
    check_similarity("maxTextSimilarity", settings.max_text_similarity)?;
    check_similarity("maxImageSimilarity", settings.max_image_similarity)?;
    Ok(())
}

fn check_similarity(field: &'static str, value: f64) -> Result<(), SettingsError> {
    // NaN fails the range check as well.
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(SettingsError::SimilarityOutOfRange { field, value })
    }
}

/// Holds the current search tuning parameters. Replaced wholesale.
#[derive(Clone)]
pub struct SettingsStore {
    current: Arc<watch::Sender<SearchSettings>>,
}

impl SettingsStore {
    pub fn new(initial: SearchSettings) -> Result<Self, SettingsError> {
        validate(&initial)?;
        let (sender, _) = watch::channel(initial);
        Ok(Self {
            current: Arc::new(sender),
        })
    }

    pub fn get(&self) -> SearchSettings {
        self.current.borrow().clone()
    }

    pub fn set(&self, next: SearchSettings) -> Result<(), SettingsError> {
        validate(&next)?;
        log::debug!("Search settings updated: {:?}", next);
        self.current.send_replace(next);
        Ok(())
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchSettings> {
        self.current.subscribe()
    }
}

impl Default for SettingsStore {
    fn default() -> Self {
        let (sender, _) = watch::channel(SearchSettings::default());
        Self {
            current: Arc::new(sender),
        }
    }
}
