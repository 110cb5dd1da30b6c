//! 知识库文件管理 - 上传、列出与删除知识库目录中的文件

use std::collections::BTreeSet;
use std::io;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use walkdir::WalkDir;

use super::{DocumentType, is_supported};

/// Uploads without a document type land here and are not indexed.
pub const UPLOAD_DIR: &str = "uploaded_files";

const UPLOAD_EXTENSIONS: [&str; 6] = ["txt", "md", "pdf", "docx", "json", "csv"];

#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("Knowledge base is disabled")]
    Disabled,

    #[error("Invalid file name: {0}")]
    InvalidName(String),

    #[error("File type {0} not supported. Allowed: {allowed}", allowed = UPLOAD_EXTENSIONS.join(", "))]
    UnsupportedType(String),

    #[error("Unknown document category: {0}")]
    UnknownCategory(String),

    #[error("Knowledge file operation failed: {0}")]
    Io(#[from] io::Error),

    #[error("Reindexing failed: {0}")]
    Reindex(String),
}

/// 知识库中的单个文件
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KnowledgeFile {
    pub name: String,
    /// Path relative to the knowledge base root
    pub path: String,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub category: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KnowledgeFileList {
    pub files: Vec<KnowledgeFile>,
    pub total: usize,
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadedFile {
    pub message: String,
    pub file_path: String,
    pub size: u64,
    /// Whether the file is part of the index after the upload
    pub processed: bool,
    #[serde(skip)]
    pub indexable: bool,
}

/// A bare file name: one normal path component.
fn validate_name(filename: &str) -> Result<(), KnowledgeError> {
    let mut components = Path::new(filename).components();
    let valid = matches!(components.next(), Some(Component::Normal(_)))
        && components.next().is_none()
        && !filename.contains(['/', '\\']);

    if valid {
        Ok(())
    } else {
        Err(KnowledgeError::InvalidName(filename.to_string()))
    }
}

fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_lowercase()))
        .unwrap_or_default()
}

/// Picks a free name, adding a timestamp when `filename` is taken.
fn free_target(dir: &Path, filename: &str) -> PathBuf {
    let target = dir.join(filename);
    if !target.exists() {
        return target;
    }

    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let (stem, ext) = match filename.rsplit_once('.') {
        Some((stem, ext)) => (stem, Some(ext)),
        None => (filename, None),
    };

    let mut suffix = timestamp.to_string();
    let mut counter = 1;
    loop {
        let candidate = match ext {
            Some(ext) => format!("{}_{}.{}", stem, suffix, ext),
            None => format!("{}_{}", stem, suffix),
        };
        let target = dir.join(candidate);
        if !target.exists() {
            return target;
        }
        suffix = format!("{}_{}", timestamp, counter);
        counter += 1;
    }
}

fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .to_string()
}

/// 保存上传的文件
///
/// With a document `category` the file goes into that type's folder and is
/// indexable when it is `.md` or `.txt`. Without one it goes to
/// `uploaded_files/`.
pub async fn upload_file(
    root: &Path,
    filename: &str,
    category: Option<&str>,
    content: &[u8],
) -> Result<UploadedFile, KnowledgeError> {
    validate_name(filename)?;

    let extension = extension_of(filename);
    if !UPLOAD_EXTENSIONS.contains(&extension.trim_start_matches('.')) {
        return Err(KnowledgeError::UnsupportedType(extension));
    }

    let dir = match category {
        Some(category) => {
            let doc_type = DocumentType::from_dir_name(category)
                .ok_or_else(|| KnowledgeError::UnknownCategory(category.to_string()))?;
            root.join(doc_type.as_str())
        }
        None => root.join(UPLOAD_DIR),
    };
    tokio::fs::create_dir_all(&dir).await?;

    let target = free_target(&dir, filename);
    tokio::fs::write(&target, content).await?;

    let name = target
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    info!("📤 知识库文件已上传: {}", target.display());

    Ok(UploadedFile {
        message: format!("File {} uploaded successfully", name),
        file_path: relative(root, &target),
        size: content.len() as u64,
        processed: false,
        indexable: category.is_some() && is_supported(&target),
    })
}

/// 列出知识库子目录下的所有文件
pub fn list_files(root: &Path) -> Result<KnowledgeFileList, KnowledgeError> {
    let mut files = Vec::new();
    if root.exists() {
        for entry in WalkDir::new(root).min_depth(2).sort_by_file_name() {
            let entry = entry.map_err(io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let metadata = entry.metadata().map_err(io::Error::from)?;
            let category = path
                .strip_prefix(root)
                .ok()
                .and_then(|relative| relative.components().next())
                .map(|first| first.as_os_str().to_string_lossy().to_string())
                .unwrap_or_default();

            files.push(KnowledgeFile {
                name: entry.file_name().to_string_lossy().to_string(),
                path: relative(root, path),
                size: metadata.len(),
                modified: metadata.modified().ok().map(DateTime::<Utc>::from),
                category,
            });
        }
    }

    let categories: BTreeSet<String> = files.iter().map(|f| f.category.clone()).collect();
    Ok(KnowledgeFileList {
        total: files.len(),
        categories: categories.into_iter().collect(),
        files,
    })
}

/// 删除第一个名为 `filename` 的文件，未找到时返回 `false`
pub fn delete_file(root: &Path, filename: &str) -> Result<bool, KnowledgeError> {
    validate_name(filename)?;
    if !root.exists() {
        return Ok(false);
    }

    let found = WalkDir::new(root)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .find(|entry| entry.file_type().is_file() && entry.file_name() == filename);

    match found {
        Some(entry) => {
            std::fs::remove_file(entry.path())?;
            info!("🗑️ 知识库文件已删除: {}", entry.path().display());
            Ok(true)
        }
        None => Ok(false),
    }
}
