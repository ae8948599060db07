//! Virtual file repository attached to each node
//!
//! A repository is a tree of named folders and files. Paths are
//! `/`-separated and relative to the repository root; the empty path is
//! the root itself.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("path `{0}` does not exist")]
    NotFound(String),

    #[error("path `{0}` is a directory")]
    IsADirectory(String),

    #[error("path `{0}` is not a directory")]
    NotADirectory(String),
}

/// Kind of a repository entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ObjectType {
    File,
    Directory,
}

/// One entry as reported by a listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoObject {
    pub name: String,
    #[serde(rename = "type")]
    pub object_type: ObjectType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
enum Entry {
    Directory(Folder),
    File(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct Folder {
    #[serde(default)]
    objects: BTreeMap<String, Entry>,
}

/// In-memory repository tree
///
/// Files hold UTF-8 text; binary payloads are out of scope for the
/// stores this crate reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Repository {
    root: Folder,
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|p| !p.is_empty() && *p != ".")
}

impl Repository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.root.objects.is_empty()
    }

    /// Store `content` at `path`, creating intermediate folders
    pub fn put_object(&mut self, path: &str, content: impl Into<String>) -> Result<(), RepositoryError> {
        let parts: Vec<&str> = split_path(path).collect();
        let Some((file_name, folders)) = parts.split_last() else {
            return Err(RepositoryError::IsADirectory(path.to_string()));
        };

        let mut folder = &mut self.root;
        for part in folders {
            let entry = folder
                .objects
                .entry(part.to_string())
                .or_insert_with(|| Entry::Directory(Folder::default()));
            folder = match entry {
                Entry::Directory(f) => f,
                Entry::File(_) => return Err(RepositoryError::NotADirectory(part.to_string())),
            };
        }

        if let Some(Entry::Directory(_)) = folder.objects.get(*file_name) {
            return Err(RepositoryError::IsADirectory(path.to_string()));
        }
        folder
            .objects
            .insert(file_name.to_string(), Entry::File(content.into()));
        Ok(())
    }

    pub fn with_object(mut self, path: &str, content: impl Into<String>) -> Result<Self, RepositoryError> {
        self.put_object(path, content)?;
        Ok(self)
    }

    fn lookup(&self, path: &str) -> Result<Option<&Entry>, RepositoryError> {
        let mut folder = &self.root;
        let mut parts = split_path(path).peekable();
        while let Some(part) = parts.next() {
            let entry = folder
                .objects
                .get(part)
                .ok_or_else(|| RepositoryError::NotFound(path.to_string()))?;
            match entry {
                Entry::Directory(f) => folder = f,
                Entry::File(_) if parts.peek().is_none() => return Ok(Some(entry)),
                Entry::File(_) => return Err(RepositoryError::NotFound(path.to_string())),
            }
        }
        // Root or a folder
        Ok(None)
    }

    /// Describe the entry at `path`
    pub fn get_object(&self, path: &str) -> Result<RepoObject, RepositoryError> {
        let name = split_path(path).last().unwrap_or_default().to_string();
        let object_type = match self.lookup(path)? {
            Some(_) => ObjectType::File,
            None => ObjectType::Directory,
        };
        Ok(RepoObject { name, object_type })
    }

    /// List a folder's entries in name order
    pub fn list_objects(&self, path: &str) -> Result<Vec<RepoObject>, RepositoryError> {
        let folder = self.folder(path)?;
        Ok(folder
            .objects
            .iter()
            .map(|(name, entry)| RepoObject {
                name: name.clone(),
                object_type: match entry {
                    Entry::Directory(_) => ObjectType::Directory,
                    Entry::File(_) => ObjectType::File,
                },
            })
            .collect())
    }

    /// List `path`, or describe it alone when it names a file
    pub fn listing(&self, path: &str) -> Result<Vec<RepoObject>, RepositoryError> {
        match self.list_objects(path) {
            Err(RepositoryError::NotADirectory(_)) => Ok(vec![self.get_object(path)?]),
            other => other,
        }
    }

    /// Raw content of the file at `path`
    pub fn get_object_content(&self, path: &str) -> Result<Vec<u8>, RepositoryError> {
        match self.lookup(path)? {
            Some(Entry::File(content)) => Ok(content.as_bytes().to_vec()),
            _ => Err(RepositoryError::IsADirectory(path.to_string())),
        }
    }

    fn folder(&self, path: &str) -> Result<&Folder, RepositoryError> {
        let mut folder = &self.root;
        for part in split_path(path) {
            match folder.objects.get(part) {
                Some(Entry::Directory(f)) => folder = f,
                Some(Entry::File(_)) => return Err(RepositoryError::NotADirectory(path.to_string())),
                None => return Err(RepositoryError::NotFound(path.to_string())),
            }
        }
        Ok(folder)
    }
}
