// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use config::{Config, File, FileFormat};
use serde::Deserialize;

use super::error::ConfigError;

/// A dialogue index maps speech IDs to the wave files holding each spoken line.
///
/// ```yaml
/// speeches:
///   "1001": greeting.wav
///   "1002": lines/farewell.wav
/// ```
#[derive(Deserialize, Clone, Debug, Default)]
pub struct DialogueIndex {
    /// Speech ID (as written in the file) to wave path.
    #[serde(default)]
    speeches: HashMap<String, PathBuf>,

    #[serde(skip)]
    base_path: Option<PathBuf>,
}

impl DialogueIndex {
    /// Parses a dialogue index from a YAML file. Relative wave paths resolve against the
    /// directory holding the index.
    pub fn deserialize(path: &Path) -> Result<DialogueIndex, ConfigError> {
        let mut index = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<DialogueIndex>()?;
        index.base_path = path.parent().map(Path::to_path_buf);
        Ok(index)
    }

    /// Parses a dialogue index from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<DialogueIndex, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize::<DialogueIndex>()?)
    }

    /// Returns the wave path for the given speech, if the index knows it.
    pub fn resolve(&self, speech_id: u32) -> Option<PathBuf> {
        let path = self.speeches.get(&speech_id.to_string())?;
        match &self.base_path {
            Some(base) if path.is_relative() => Some(base.join(path)),
            _ => Some(path.clone()),
        }
    }

    /// Returns the number of speeches in the index.
    pub fn len(&self) -> usize {
        self.speeches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.speeches.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve() {
        let yaml = r#"
            speeches:
              "1001": greeting.wav
              "1002": /abs/farewell.wav
        "#;
        let index = DialogueIndex::from_yaml(yaml).unwrap();

        assert_eq!(index.len(), 2);
        assert_eq!(index.resolve(1001), Some(PathBuf::from("greeting.wav")));
        assert_eq!(index.resolve(1002), Some(PathBuf::from("/abs/farewell.wav")));
        assert_eq!(index.resolve(7), None);
    }

    #[test]
    fn test_relative_to_index_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dialogue.yaml");
        std::fs::write(&path, "speeches:\n  \"5\": lines/five.wav\n").unwrap();

        let index = DialogueIndex::deserialize(&path).unwrap();
        assert_eq!(index.resolve(5), Some(dir.path().join("lines/five.wav")));
    }

    #[test]
    fn test_empty_index() {
        let index = DialogueIndex::from_yaml("speeches: {}").unwrap();
        assert!(index.is_empty());
        assert_eq!(index.resolve(1), None);
    }
}
