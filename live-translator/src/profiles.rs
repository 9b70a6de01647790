//! Application profiles.
//!
//! A profile describes one target application: how to recognize its window,
//! which screen regions carry text, the recognition settings that suit it, and
//! the terms it uses. Profiles are JSON files keyed by file stem.

use crate::config::{Config, ConfigError};
use crate::types::{MonitorTarget, Rect, WindowInfo};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrSettings {
    #[serde(default)]
    pub confidence_threshold: Option<f32>,
    #[serde(default)]
    pub languages: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub name: String,
    pub description: String,
    pub executable: String,
    pub window_title_pattern: String,
    pub manufacturer: String,
    pub category: String,
    #[serde(default)]
    pub ocr_settings: OcrSettings,
    /// Region name to `[x, y, width, height]`
    #[serde(default)]
    pub ui_regions: BTreeMap<String, Value>,
    #[serde(default)]
    pub common_terms: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_elements: Option<BTreeMap<String, BTreeMap<String, String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_codes: Option<BTreeMap<String, String>>,
}

impl Profile {
    /// Common terms plus every UI element group
    pub fn glossary(&self) -> BTreeMap<String, String> {
        let mut glossary = self.common_terms.clone();
        if let Some(elements) = &self.ui_elements {
            for terms in elements.values() {
                glossary.extend(terms.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }
        glossary
    }

    /// Region targets, skipping entries that are not four numbers
    pub fn regions(&self) -> Vec<MonitorTarget> {
        self.ui_regions
            .iter()
            .filter_map(|(name, coords)| match parse_rect(coords) {
                Some(rect) => Some(MonitorTarget::Region {
                    rect,
                    name: name.clone(),
                }),
                None => {
                    debug!("Profile '{}': skipping malformed region '{}'", self.name, name);
                    None
                }
            })
            .collect()
    }

    /// Whether `executable` names this profile's program. The platform may
    /// report the owner without its `.exe` suffix.
    pub fn matches_executable(&self, executable: &str) -> bool {
        let own = self.executable.to_lowercase();
        if own.is_empty() {
            return false;
        }
        let other = executable.to_lowercase();
        other == own || Some(other.as_str()) == own.strip_suffix(".exe")
    }

    /// Title pattern with wildcards removed, matched case-insensitively.
    /// An empty pattern matches nothing.
    pub fn matches_title(&self, title: &str) -> bool {
        let pattern = self.window_title_pattern.replace('*', "").to_lowercase();
        !pattern.is_empty() && title.to_lowercase().contains(&pattern)
    }

    pub fn matches_window(&self, window: &WindowInfo) -> bool {
        self.matches_executable(&window.app_name) || self.matches_title(&window.title)
    }

    /// First of `windows` (front to back) that belongs to this profile
    pub fn find_window<'a>(&self, windows: &'a [WindowInfo]) -> Option<&'a WindowInfo> {
        windows.iter().find(|w| self.matches_window(w))
    }

    /// Copy the profile's recognition settings into `config`
    pub fn apply_settings(&self, config: &mut Config) -> Result<(), ConfigError> {
        if let Some(threshold) = self.ocr_settings.confidence_threshold {
            config.apply_override("recognition.confidence_threshold", &threshold.to_string())?;
        }
        if let Some(languages) = &self.ocr_settings.languages {
            config.apply_override("recognition.languages", &languages.join(","))?;
        }
        Ok(())
    }
}

fn parse_rect(value: &Value) -> Option<Rect> {
    let coords = value.as_array()?;
    if coords.len() != 4 {
        return None;
    }
    let mut nums = [0i64; 4];
    for (slot, v) in nums.iter_mut().zip(coords) {
        *slot = v.as_f64()?.round() as i64;
    }
    let [x, y, w, h] = nums;
    if w < 0 || h < 0 {
        return None;
    }
    Some(Rect::new(x as i32, y as i32, w as u32, h as u32))
}

/// Listing entry for a loaded profile
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileSummary {
    pub key: String,
    pub name: String,
    pub manufacturer: String,
    pub category: String,
    pub description: String,
}

#[derive(Debug, Default)]
pub struct ProfileManager {
    profiles: BTreeMap<String, Profile>,
}

impl ProfileManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `*.json` in `dir`. Malformed files are skipped; a missing
    /// directory yields an empty manager.
    pub fn load_dir<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref();
        let mut manager = Self::new();

        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot read profiles directory {:?}: {}", dir, e);
                return manager;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Err(e) = manager.load_file(&path) {
                warn!("Skipping profile {:?}: {}", path, e);
            }
        }

        info!("Loaded {} application profiles", manager.profiles.len());
        manager
    }

    /// Load one profile file under its file stem
    pub fn load_file(&mut self, path: &Path) -> Result<&Profile, ConfigError> {
        let key = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| ConfigError::Invalid(format!("bad profile file name {:?}", path)))?
            .to_string();

        let contents = std::fs::read_to_string(path)?;
        let profile: Profile = serde_json::from_str(&contents)
            .map_err(|e| ConfigError::Invalid(format!("{:?}: {}", path, e)))?;

        debug!("Loaded profile '{}' as '{}'", profile.name, key);
        Ok(self.insert(key, profile))
    }

    pub fn insert(&mut self, key: String, profile: Profile) -> &Profile {
        self.profiles.insert(key.clone(), profile);
        &self.profiles[&key]
    }

    pub fn get(&self, key: &str) -> Option<&Profile> {
        self.profiles.get(key)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    pub fn by_category(&self, category: &str) -> Vec<&Profile> {
        self.profiles.values().filter(|p| p.category == category).collect()
    }

    pub fn by_manufacturer(&self, manufacturer: &str) -> Vec<&Profile> {
        self.profiles
            .values()
            .filter(|p| p.manufacturer.eq_ignore_ascii_case(manufacturer))
            .collect()
    }

    pub fn find_by_executable(&self, executable: &str) -> Option<&Profile> {
        self.profiles.values().find(|p| p.matches_executable(executable))
    }

    /// First profile whose title pattern (wildcards removed) occurs in `title`
    pub fn find_by_window_title(&self, title: &str) -> Option<&Profile> {
        self.profiles.values().find(|p| p.matches_title(title))
    }

    /// Profile for a live window: executable match first, then title
    pub fn find_for_window(&self, window: &WindowInfo) -> Option<&Profile> {
        self.find_by_executable(&window.app_name)
            .or_else(|| self.find_by_window_title(&window.title))
    }

    /// First window in `windows` that some profile claims, with that profile
    pub fn detect<'a>(&self, windows: &'a [WindowInfo]) -> Option<(&Profile, &'a WindowInfo)> {
        windows
            .iter()
            .find_map(|window| self.find_for_window(window).map(|profile| (profile, window)))
    }

    /// Glossary of the profile under `key`; empty when unknown
    pub fn glossary(&self, key: &str) -> BTreeMap<String, String> {
        self.get(key).map(Profile::glossary).unwrap_or_default()
    }

    pub fn summaries(&self) -> Vec<ProfileSummary> {
        self.profiles
            .iter()
            .map(|(key, p)| ProfileSummary {
                key: key.clone(),
                name: p.name.clone(),
                manufacturer: p.manufacturer.clone(),
                category: p.category.clone(),
                description: p.description.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROBOT_PROFILE: &str = r#"{
        "name": "Robot Studio",
        "description": "Robot programming suite",
        "executable": "RobotStudio.exe",
        "window_title_pattern": "*Robot Studio*",
        "manufacturer": "Acme",
        "category": "robotics",
        "ocr_settings": {"confidence_threshold": 0.6, "languages": ["ch_sim", "en"]},
        "ui_regions": {
            "alarm_bar": [0, 900, 1920, 60],
            "broken": [1, 2, 3],
            "menu": [0, 0, 1920, 40]
        },
        "common_terms": {"机器人": "Robot"},
        "ui_elements": {"buttons": {"确定": "OK"}, "menus": {"文件": "File"}},
        "error_codes": {"E001": "过载"}
    }"#;

    fn manager_with_profile() -> (tempfile::TempDir, ProfileManager) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("robot_studio.json"), ROBOT_PROFILE).unwrap();
        std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        let manager = ProfileManager::load_dir(dir.path());
        (dir, manager)
    }

    #[test]
    fn test_load_dir_skips_bad_files() {
        let (_dir, manager) = manager_with_profile();
        assert_eq!(manager.len(), 1);
        assert!(manager.get("robot_studio").is_some());
        assert!(manager.get("broken").is_none());
    }

    #[test]
    fn test_lookups() {
        let (_dir, manager) = manager_with_profile();
        assert!(manager.find_by_executable("robotstudio.EXE").is_some());
        assert!(manager.find_by_window_title("Station 3 - ROBOT STUDIO 2024").is_some());
        assert!(manager.find_by_window_title("Notepad").is_none());
        assert_eq!(manager.by_manufacturer("acme").len(), 1);
        assert_eq!(manager.by_category("robotics").len(), 1);
        assert_eq!(manager.summaries()[0].key, "robot_studio");
    }

    #[test]
    fn test_glossary_merges_ui_elements() {
        let (_dir, manager) = manager_with_profile();
        let glossary = manager.glossary("robot_studio");
        assert_eq!(glossary.len(), 3);
        assert_eq!(glossary["确定"], "OK");
        assert!(manager.glossary("missing").is_empty());
    }

    #[test]
    fn test_regions_skip_malformed() {
        let (_dir, manager) = manager_with_profile();
        let regions = manager.get("robot_studio").unwrap().regions();
        assert_eq!(regions.len(), 2);
        assert_eq!(
            regions[0],
            MonitorTarget::Region {
                rect: Rect::new(0, 900, 1920, 60),
                name: "alarm_bar".into(),
            }
        );
    }

    #[test]
    fn test_apply_settings() {
        let (_dir, manager) = manager_with_profile();
        let mut config = Config::default();
        manager
            .get("robot_studio")
            .unwrap()
            .apply_settings(&mut config)
            .unwrap();
        assert!((config.recognition.confidence_threshold - 0.6).abs() < 1e-6);
        assert_eq!(config.recognition.languages, vec!["ch_sim", "en"]);
    }

    fn window(id: u64, app_name: &str, title: &str) -> WindowInfo {
        WindowInfo {
            id,
            title: title.into(),
            app_name: app_name.into(),
            pid: 100 + id as u32,
            bounds: Rect::new(0, 0, 1280, 800),
        }
    }

    #[test]
    fn test_window_matching() {
        let (_dir, manager) = manager_with_profile();
        let profile = manager.get("robot_studio").unwrap();

        assert!(profile.matches_window(&window(1, "RobotStudio", "Untitled")));
        assert!(profile.matches_window(&window(2, "Launcher", "Cell 4 - Robot Studio")));
        assert!(!profile.matches_window(&window(3, "Finder", "Documents")));

        let windows = vec![
            window(3, "Finder", "Documents"),
            window(1, "RobotStudio", "Untitled"),
        ];
        assert_eq!(profile.find_window(&windows).map(|w| w.id), Some(1));

        let (found, win) = manager.detect(&windows).unwrap();
        assert_eq!(found.name, "Robot Studio");
        assert_eq!(win.id, 1);
        assert!(manager.detect(&windows[..1]).is_none());
    }

    #[test]
    fn test_blank_title_pattern_matches_nothing() {
        let mut profile: Profile = serde_json::from_str(ROBOT_PROFILE).unwrap();
        profile.window_title_pattern = "**".into();
        profile.executable.clear();
        assert!(!profile.matches_window(&window(1, "Anything", "Any title")));
    }

    #[test]
    fn test_missing_dir_is_empty() {
        let manager = ProfileManager::load_dir("/nonexistent/profiles");
        assert!(manager.is_empty());
    }
}
