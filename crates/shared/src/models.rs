//! Data models for the catalog.
//!
//! This module defines the records that flow through the acquisition pipeline
//! and end up in the published catalog: anime references, characters,
//! opening/ending themes and their difficulty tiers.

use serde::{Deserialize, Serialize};

/// Popularity/rank assigned to anime the upstream has not ranked.
pub const UNRANKED: u32 = 99_999;

/// Difficulty tier of a catalog record
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Difficulty {
    #[serde(alias = "easy")]
    Easy,
    #[serde(alias = "medium")]
    Medium,
    #[serde(alias = "hard")]
    Hard,
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "Easy"),
            Difficulty::Medium => write!(f, "Medium"),
            Difficulty::Hard => write!(f, "Hard"),
        }
    }
}

impl std::str::FromStr for Difficulty {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            _ => Err(anyhow::anyhow!("Invalid difficulty: {}", s)),
        }
    }
}

/// Anime images
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AnimeImages {
    #[serde(default)]
    pub jpg: ImageSet,
    #[serde(default)]
    pub webp: Option<ImageSet>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ImageSet {
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub small_image_url: Option<String>,
    #[serde(default)]
    pub large_image_url: Option<String>,
}

/// Anime candidate produced by discovery and embedded in every catalog record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnimeRef {
    pub mal_id: u32,
    pub title: String,
    #[serde(default)]
    pub english_title: Option<String>,
    #[serde(default)]
    pub score: f64,
    #[serde(default = "unranked")]
    pub popularity: u32,
    #[serde(default)]
    pub members: u64,
    #[serde(default = "unranked")]
    pub rank: u32,
    #[serde(default)]
    pub images: Option<AnimeImages>,
}

fn unranked() -> u32 {
    UNRANKED
}

/// A main character in the catalog
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CharacterEntry {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub favorites: u64,
    pub difficulty: Difficulty,
    #[serde(rename = "anime_data")]
    pub anime: AnimeRef,
}

/// Theme song kind
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ThemeType {
    #[serde(rename = "OP")]
    Opening,
    #[serde(rename = "ED")]
    Ending,
}

impl std::fmt::Display for ThemeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThemeType::Opening => write!(f, "OP"),
            ThemeType::Ending => write!(f, "ED"),
        }
    }
}

/// An opening (or ending) theme in the catalog
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OpeningEntry {
    pub id: String,
    #[serde(rename = "name")]
    pub title: String,
    pub artist: String,
    #[serde(rename = "type")]
    pub theme_type: ThemeType,
    #[serde(rename = "anime_data")]
    pub anime: AnimeRef,
    pub difficulty: Difficulty,
}
