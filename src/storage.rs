use std::{
    fmt, io,
    path::{Path, PathBuf},
};

use tracing::instrument;

use crate::domain::CostElement;

pub mod boq;
pub mod cef;
pub mod session;
pub mod xml;

pub use xml::{WriteError, XmlError};

/// Target grammar for [`export_document`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExportMode {
    /// The `cefexport` interchange format, grouped by `Id`.
    #[default]
    Cef,
    /// The flat `Award/BoQ/Item` grammar.
    Boq,
}

impl fmt::Display for ExportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cef => f.write_str("cef"),
            Self::Boq => f.write_str("boq"),
        }
    }
}

/// The kinds of document [`load`] understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    /// A `cefexport` interchange file.
    Interchange,
    /// A saved session.
    Session,
}

impl DocumentKind {
    /// Identifies a document by its root element.
    #[must_use]
    pub fn detect(root: &xml::XmlNode) -> Option<Self> {
        if root.is(cef::ROOT) {
            Some(Self::Interchange)
        } else if root.is(session::ROOT) {
            Some(Self::Session)
        } else {
            None
        }
    }
}

/// A document could not be read.
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    /// The file could not be read.
    #[error("failed to read {}", .path.display())]
    Io {
        /// The file being read.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The file is not well-formed XML.
    #[error("failed to parse {}", .path.display())]
    Parse {
        /// The file being read.
        path: PathBuf,
        /// The parser error, with its position.
        #[source]
        source: XmlError,
    },
    /// The root element belongs to neither known format.
    #[error("{} is neither an interchange file nor a session (root element <{root}>)", .path.display())]
    UnknownFormat {
        /// The file being read.
        path: PathBuf,
        /// Name of the root element found.
        root: String,
    },
}

/// A document could not be written.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    /// The file could not be written.
    #[error("failed to write {}", .path.display())]
    Io {
        /// The file being written.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The document could not be serialized.
    #[error("failed to serialize document")]
    Xml(#[from] WriteError),
}

fn read_root(path: &Path) -> Result<xml::XmlNode, ImportError> {
    let bytes = std::fs::read(path).map_err(|source| ImportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    xml::parse(&xml::decode(&bytes)).map_err(|source| ImportError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn write_file(path: &Path, contents: &str) -> Result<(), ExportError> {
    std::fs::write(path, contents).map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads an interchange file, one element per calculation.
///
/// # Errors
///
/// Fails if the file cannot be read or is not well-formed XML.
#[instrument]
pub fn import_document(path: &Path) -> Result<Vec<CostElement>, ImportError> {
    let elements = cef::read_document(&read_root(path)?);
    tracing::info!("Imported {} elements from {}", elements.len(), path.display());
    Ok(elements)
}

/// Reads an interchange file or a session, whichever `path` holds.
///
/// # Errors
///
/// Fails if the file cannot be read, is not well-formed XML, or has an
/// unrecognised root element.
#[instrument]
pub fn load(path: &Path) -> Result<(DocumentKind, Vec<CostElement>), ImportError> {
    let root = read_root(path)?;
    let kind = DocumentKind::detect(&root).ok_or_else(|| ImportError::UnknownFormat {
        path: path.to_path_buf(),
        root: root.name.clone(),
    })?;
    let elements = match kind {
        DocumentKind::Interchange => cef::read_document(&root),
        DocumentKind::Session => session::read_document(&root),
    };
    tracing::info!(
        "Loaded {} elements ({kind:?}) from {}",
        elements.len(),
        path.display()
    );
    Ok((kind, elements))
}

/// Writes `elements` to `path` in the given grammar.
///
/// # Errors
///
/// Fails if the document cannot be serialized or the file cannot be written.
#[instrument(skip(elements))]
pub fn export_document(
    elements: &[CostElement],
    path: &Path,
    mode: ExportMode,
) -> Result<(), ExportError> {
    let document = match mode {
        ExportMode::Cef => cef::write(elements)?,
        ExportMode::Boq => boq::write(elements)?,
    };
    write_file(path, &document)?;
    tracing::info!("Exported {} elements to {}", elements.len(), path.display());
    Ok(())
}

/// Reads a session file.
///
/// # Errors
///
/// Fails if the file cannot be read or is not well-formed XML.
#[instrument]
pub fn load_session(path: &Path) -> Result<Vec<CostElement>, ImportError> {
    Ok(session::read_document(&read_root(path)?))
}

/// Writes a session file.
///
/// # Errors
///
/// Fails if the document cannot be serialized or the file cannot be written.
#[instrument(skip(elements))]
pub fn save_session(elements: &[CostElement], path: &Path) -> Result<(), ExportError> {
    write_file(path, &session::write(elements)?)?;
    tracing::debug!("Saved session with {} elements", elements.len());
    Ok(())
}
