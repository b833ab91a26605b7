use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub const TITLE_MIN_CHARS: usize = 3;
pub const TITLE_MAX_CHARS: usize = 100;
pub const MESSAGE_MIN_CHARS: usize = 10;

/// Who wrote the memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Author {
    Him,
    Her,
}

impl Author {
    pub fn as_str(&self) -> &'static str {
        match self {
            Author::Him => "him",
            Author::Her => "her",
        }
    }
}

impl FromStr for Author {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "him" => Ok(Author::Him),
            "her" => Ok(Author::Her),
            _ => Err("createdBy must be either 'him' or 'her'".to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
        }
    }

    /// Derive the kind from a MIME type prefix.
    pub fn from_mime(mime: &str) -> Option<Self> {
        if mime.starts_with("image/") {
            Some(MediaKind::Image)
        } else if mime.starts_with("video/") {
            Some(MediaKind::Video)
        } else if mime.starts_with("audio/") {
            Some(MediaKind::Audio)
        } else {
            None
        }
    }
}

impl FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "image" => Ok(MediaKind::Image),
            "video" => Ok(MediaKind::Video),
            "audio" => Ok(MediaKind::Audio),
            other => Err(format!("unknown media type: {other}")),
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attachment stored on the media host. Always carries both url and public id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    #[serde(rename = "type")]
    pub kind: MediaKind,
    pub url: String,
    pub public_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Memory {
    pub id: Uuid,
    pub title: String,
    pub message: String,
    pub date: DateTime<Utc>,
    pub created_by: Author,
    pub media: Option<Media>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Memory {
    /// Build a new memory, validating every field.
    pub fn new(
        title: &str,
        message: &str,
        date: DateTime<Utc>,
        created_by: Author,
    ) -> Result<Self, Vec<String>> {
        let now = Utc::now();
        let memory = Self {
            id: Uuid::new_v4(),
            title: title.trim().to_string(),
            message: message.to_string(),
            date,
            created_by,
            media: None,
            created_at: now,
            updated_at: now,
        };
        memory.validate()?;
        Ok(memory)
    }

    /// Returns every failed rule, not just the first.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        let title_len = self.title.chars().count();
        if title_len < TITLE_MIN_CHARS {
            errors.push(format!(
                "Title must be at least {TITLE_MIN_CHARS} characters"
            ));
        }
        if title_len > TITLE_MAX_CHARS {
            errors.push(format!("Title cannot exceed {TITLE_MAX_CHARS} characters"));
        }
        if self.message.chars().count() < MESSAGE_MIN_CHARS {
            errors.push(format!(
                "Message must be at least {MESSAGE_MIN_CHARS} characters"
            ));
        }
        if let Some(media) = &self.media {
            if media.url.is_empty() || media.public_id.is_empty() {
                errors.push("Media must have both URL and publicId".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Accepts RFC 3339 timestamps or bare `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
