use std::fmt;

use serde::Deserialize;

use crate::Result;

/// One asset on the camera, addressed as `directory/filename`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaRef {
    pub directory: String,
    pub filename: String,
}

impl MediaRef {
    pub fn new(directory: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            filename: filename.into(),
        }
    }
}

impl fmt::Display for MediaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.directory, self.filename)
    }
}

/// Body of `GET /gp/gpMediaList`.
///
/// Directories and files are kept in the order the camera reports them.
#[derive(Debug, Clone, Deserialize)]
pub struct MediaList {
    pub media: Vec<MediaDirectory>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MediaDirectory {
    #[serde(rename = "d")]
    pub directory: String,
    #[serde(rename = "fs")]
    pub files: Vec<MediaEntry>,
}

/// Older firmware lists bare filenames, newer firmware lists objects keyed by `n`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MediaEntry {
    Name(String),
    File {
        #[serde(rename = "n")]
        name: String,
    },
}

impl MediaEntry {
    pub fn name(&self) -> &str {
        match self {
            MediaEntry::Name(name) | MediaEntry::File { name } => name,
        }
    }
}

impl MediaList {
    pub fn parse(body: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(body)?)
    }

    pub fn iter(&self) -> impl Iterator<Item = MediaRef> + '_ {
        self.media.iter().flat_map(|dir| {
            dir.files
                .iter()
                .map(move |file| MediaRef::new(dir.directory.as_str(), file.name()))
        })
    }

    pub fn into_refs(self) -> impl Iterator<Item = MediaRef> {
        self.media.into_iter().flat_map(|dir| {
            let directory = dir.directory;
            dir.files
                .into_iter()
                .map(move |file| MediaRef::new(directory.clone(), file.name()))
        })
    }

    /// The last reported asset, which the camera lists as the newest capture.
    pub fn latest(&self) -> Option<MediaRef> {
        self.iter().last()
    }
}
