use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::ImageFormat;
use shared::{CompiledQuery, Rgb, SearchRequest, SearchSettings};
use std::path::{Path, PathBuf};
use strum::{Display, EnumString};

use crate::vocabulary;

const DEFAULT_COLOR: Rgb = [47, 119, 150];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum Modality {
    Text,
    Color,
    Image,
    Objects,
    Words,
}

impl Modality {
    pub const ALL: [Modality; 5] = [
        Modality::Text,
        Modality::Color,
        Modality::Image,
        Modality::Objects,
        Modality::Words,
    ];
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("No search modality is enabled")]
    EmptyQuery,
    #[error("The {0} query can't be empty")]
    MissingRequiredValue(Modality),
    #[error("Unknown object label: {0}")]
    UnknownObject(String),
}

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Failed to read image {path}: {source}")]
    ImageRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("Invalid color {0:?}, expected rgb(r, g, b)")]
pub struct ColorParseError(String);

/// Parses the display form `rgb(r, g, b)`.
pub fn parse_rgb(input: &str) -> Result<Rgb, ColorParseError> {
    let err = || ColorParseError(input.to_string());
    let inner = input
        .trim()
        .strip_prefix("rgb(")
        .and_then(|rest| rest.strip_suffix(')'))
        .ok_or_else(err)?;

    let channels = inner
        .split(',')
        .map(|c| c.trim().parse::<u8>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| err())?;

    match channels.as_slice() {
        [r, g, b] => Ok([*r, *g, *b]),
        _ => Err(err()),
    }
}

pub fn format_rgb(color: &Rgb) -> String {
    format!("rgb({}, {}, {})", color[0], color[1], color[2])
}

/// Lower-cases, trims and splits on whitespace, dropping empty tokens.
pub fn tokenize_words(input: &str) -> Vec<String> {
    input
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    File(PathBuf),
    Bytes(Vec<u8>),
}

impl ImageSource {
    async fn to_data_uri(&self) -> Result<String, QueryError> {
        match self {
            ImageSource::File(path) => {
                let bytes = tokio::fs::read(path)
                    .await
                    .map_err(|source| QueryError::ImageRead {
                        path: path.clone(),
                        source,
                    })?;
                Ok(encode_data_uri(&bytes, Some(path)))
            }
            ImageSource::Bytes(bytes) => Ok(encode_data_uri(bytes, None)),
        }
    }
}

pub fn encode_data_uri(bytes: &[u8], path: Option<&Path>) -> String {
    let mime = image::guess_format(bytes)
        .ok()
        .or_else(|| path.and_then(|p| ImageFormat::from_path(p).ok()))
        .map(|format| format.to_mime_type())
        .unwrap_or("application/octet-stream");
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModalityValue {
    Text(String),
    Color(Option<Rgb>),
    Image(Option<ImageSource>),
    Objects(Vec<String>),
    Words(String),
}

impl ModalityValue {
    pub fn modality(&self) -> Modality {
        match self {
            ModalityValue::Text(_) => Modality::Text,
            ModalityValue::Color(_) => Modality::Color,
            ModalityValue::Image(_) => Modality::Image,
            ModalityValue::Objects(_) => Modality::Objects,
            ModalityValue::Words(_) => Modality::Words,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
struct Slot<T> {
    enabled: bool,
    value: T,
}

/// The five independently toggleable search inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryModalitySet {
    text: Slot<String>,
    color: Slot<Option<Rgb>>,
    image: Slot<Option<ImageSource>>,
    objects: Slot<Vec<String>>,
    words: Slot<Vec<String>>,
}

impl Default for QueryModalitySet {
    fn default() -> Self {
        Self {
            text: Slot {
                enabled: true,
                value: String::new(),
            },
            color: Slot {
                enabled: false,
                value: Some(DEFAULT_COLOR),
            },
            image: Slot::default(),
            objects: Slot::default(),
            words: Slot::default(),
        }
    }
}

impl QueryModalitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutates exactly the slot named by `value`.
    pub fn set_modality(&mut self, enabled: bool, value: ModalityValue) -> Result<(), ValidationError> {
        let modality = value.modality();
        self.set_value(value)?;
        self.set_enabled(modality, enabled);
        Ok(())
    }

    pub fn set_value(&mut self, value: ModalityValue) -> Result<(), ValidationError> {
        match value {
            ModalityValue::Text(text) => self.text.value = text,
            ModalityValue::Color(color) => self.color.value = color,
            ModalityValue::Image(image) => self.image.value = image,
            ModalityValue::Objects(labels) => self.objects.value = dedup_labels(labels)?,
            ModalityValue::Words(words) => self.words.value = tokenize_words(&words),
        }
        Ok(())
    }

    pub fn set_enabled(&mut self, modality: Modality, enabled: bool) {
        match modality {
            Modality::Text => self.text.enabled = enabled,
            Modality::Color => self.color.enabled = enabled,
            Modality::Image => self.image.enabled = enabled,
            Modality::Objects => self.objects.enabled = enabled,
            Modality::Words => self.words.enabled = enabled,
        }
    }

    pub fn is_enabled(&self, modality: Modality) -> bool {
        match modality {
            Modality::Text => self.text.enabled,
            Modality::Color => self.color.enabled,
            Modality::Image => self.image.enabled,
            Modality::Objects => self.objects.enabled,
            Modality::Words => self.words.enabled,
        }
    }

    /// Adds the label if absent, removes it otherwise.
    pub fn toggle_object(&mut self, label: &str) -> Result<(), ValidationError> {
        if let Some(pos) = self.objects.value.iter().position(|l| l == label) {
            self.objects.value.remove(pos);
            return Ok(());
        }
        if !vocabulary::is_known_label(label) {
            return Err(ValidationError::UnknownObject(label.to_string()));
        }
        self.objects.value.push(label.to_string());
        Ok(())
    }

    pub fn text(&self) -> &str {
        &self.text.value
    }

    pub fn color(&self) -> Option<Rgb> {
        self.color.value
    }

    pub fn image(&self) -> Option<&ImageSource> {
        self.image.value.as_ref()
    }

    pub fn objects(&self) -> &[String] {
        &self.objects.value
    }

    pub fn words(&self) -> &[String] {
        &self.words.value
    }

    /// Clears every value and disables every modality.
    pub fn reset(&mut self) {
        self.text = Slot::default();
        self.color = Slot::default();
        self.image = Slot::default();
        self.objects = Slot::default();
        self.words = Slot::default();
    }

    /// Local checks that need no I/O.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !Modality::ALL.iter().any(|m| self.is_enabled(*m)) {
            return Err(ValidationError::EmptyQuery);
        }
        if self.text.enabled && self.text.value.trim().is_empty() {
            return Err(ValidationError::MissingRequiredValue(Modality::Text));
        }
        Ok(())
    }

    /// Builds the null-padded payload. Suspends while an image file is read.
    pub async fn compile(&self) -> Result<CompiledQuery, QueryError> {
        self.validate()?;

        let image_query = match (&self.image.enabled, &self.image.value) {
            (true, Some(source)) => Some(source.to_data_uri().await?),
            _ => None,
        };

        Ok(CompiledQuery {
            text_query: self.text.enabled.then(|| self.text.value.clone()),
            color_query: self.color.value.filter(|_| self.color.enabled),
            object_query: self.objects.enabled.then(|| self.objects.value.clone()),
            image_query,
            word_query: self.words.enabled.then(|| self.words.value.clone()),
        })
    }

    pub async fn compile_request(&self, settings: &SearchSettings) -> Result<SearchRequest, QueryError> {
        Ok(SearchRequest {
            query: self.compile().await?,
            search_params: settings.clone(),
        })
    }
}

/// The same local checks as [`QueryModalitySet::validate`], applied to an
/// already compiled payload.
pub fn validate_compiled(query: &CompiledQuery) -> Result<(), ValidationError> {
    let CompiledQuery {
        text_query,
        color_query,
        object_query,
        image_query,
        word_query,
    } = query;
    if text_query.is_none()
        && color_query.is_none()
        && object_query.is_none()
        && image_query.is_none()
        && word_query.is_none()
    {
        return Err(ValidationError::EmptyQuery);
    }
    if text_query.as_deref().is_some_and(|text| text.trim().is_empty()) {
        return Err(ValidationError::MissingRequiredValue(Modality::Text));
    }
    Ok(())
}

fn dedup_labels(labels: Vec<String>) -> Result<Vec<String>, ValidationError> {
    let mut unique: Vec<String> = Vec::with_capacity(labels.len());
    for label in labels {
        if !vocabulary::is_known_label(&label) {
            return Err(ValidationError::UnknownObject(label));
        }
        if !unique.contains(&label) {
            unique.push(label);
        }
    }
    Ok(unique)
}
