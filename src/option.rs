use std::path::{Path, PathBuf};

/// Granularity of backing-file growth in bytes.
pub const DEFAULT_PAGE_SIZE: u64 = 4096;

/// Number of buffered map entries that triggers a merge to disk.
pub const DEFAULT_MAX_ITEMS_IN_MEMORY: usize = 10_000_000;

/// Options for a [`PersistentVector`](crate::vector::PersistentVector).
#[derive(Debug, Clone)]
pub struct VectorOptions {
    pub(crate) path: PathBuf,
    pub(crate) truncate: bool,
    pub(crate) page_size: u64,
}

impl<P> From<P> for VectorOptions
where
    P: Into<PathBuf>,
{
    fn from(path: P) -> Self {
        VectorOptions {
            path: path.into(),
            truncate: false,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl VectorOptions {
    /// Discard any records already stored in the file.
    pub fn truncate(self, truncate: bool) -> Self {
        VectorOptions { truncate, ..self }
    }

    /// Growth granularity; must be a non-zero multiple of 8.
    pub fn page_size(self, page_size: u64) -> Self {
        VectorOptions { page_size, ..self }
    }

    /// Backing file of the vector.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Options for a [`SerializableMap`](crate::map::SerializableMap).
#[derive(Debug, Clone)]
pub struct MapOptions {
    pub(crate) path: PathBuf,
    pub(crate) clear_contents: bool,
    pub(crate) max_items_in_memory: usize,
    pub(crate) page_size: u64,
}

impl<P> From<P> for MapOptions
where
    P: Into<PathBuf>,
{
    fn from(path: P) -> Self {
        MapOptions {
            path: path.into(),
            clear_contents: false,
            max_items_in_memory: DEFAULT_MAX_ITEMS_IN_MEMORY,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl MapOptions {
    /// Start from an empty map even if the file already holds entries.
    pub fn clear_contents(self, clear_contents: bool) -> Self {
        MapOptions {
            clear_contents,
            ..self
        }
    }

    /// Size of the in-memory buffer at which a merge is forced. Clamped to 1.
    pub fn max_items_in_memory(self, max_items_in_memory: usize) -> Self {
        MapOptions {
            max_items_in_memory: max_items_in_memory.max(1),
            ..self
        }
    }

    /// Growth granularity of the on-disk sequence.
    pub fn page_size(self, page_size: u64) -> Self {
        MapOptions { page_size, ..self }
    }

    /// File holding the sorted on-disk sequence.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Scratch file written during a merge, renamed over [`Self::path`] afterwards.
    pub fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }

    pub(crate) fn vector_options(&self, path: PathBuf, truncate: bool) -> VectorOptions {
        VectorOptions::from(path)
            .truncate(truncate)
            .page_size(self.page_size)
    }
}

/// Options for a [`ReverseIndex`](crate::index::ReverseIndex).
#[derive(Debug, Clone)]
pub struct ReverseIndexOptions {
    pub(crate) index_path: PathBuf,
    pub(crate) aux_path: PathBuf,
    pub(crate) clear_contents: bool,
    pub(crate) page_size: u64,
}

impl<P> From<P> for ReverseIndexOptions
where
    P: Into<PathBuf>,
{
    /// Same as [`ReverseIndexOptions::from_base`].
    fn from(base: P) -> Self {
        ReverseIndexOptions::from_base(base)
    }
}

impl ReverseIndexOptions {
    /// Use explicit paths for the primary slot array and the auxiliary arena.
    pub fn new(index_path: impl Into<PathBuf>, aux_path: impl Into<PathBuf>) -> Self {
        ReverseIndexOptions {
            index_path: index_path.into(),
            aux_path: aux_path.into(),
            clear_contents: false,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Derive `<base>.idx` and `<base>.aux` from a base name.
    pub fn from_base(base: impl Into<PathBuf>) -> Self {
        let base = base.into().into_os_string();
        let mut index = base.clone();
        index.push(".idx");
        let mut aux = base;
        aux.push(".aux");
        Self::new(index, aux)
    }

    /// Remove previously indexed references.
    pub fn clear_contents(self, clear_contents: bool) -> Self {
        ReverseIndexOptions {
            clear_contents,
            ..self
        }
    }

    /// Growth granularity of both backing files.
    pub fn page_size(self, page_size: u64) -> Self {
        ReverseIndexOptions { page_size, ..self }
    }

    /// Primary slot array file.
    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// Auxiliary reference-list arena file.
    pub fn aux_path(&self) -> &Path {
        &self.aux_path
    }
}

/// Options for a [`ReferenceIndexer`](crate::ingest::ReferenceIndexer).
#[derive(Debug, Clone)]
pub struct IndexerOptions {
    pub(crate) directory: PathBuf,
    pub(crate) clear_contents: bool,
    pub(crate) page_size: u64,
}

impl<P> From<P> for IndexerOptions
where
    P: Into<PathBuf>,
{
    fn from(directory: P) -> Self {
        IndexerOptions {
            directory: directory.into(),
            clear_contents: false,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl IndexerOptions {
    /// Remove previously indexed references from all three indices.
    pub fn clear_contents(self, clear_contents: bool) -> Self {
        IndexerOptions {
            clear_contents,
            ..self
        }
    }

    /// Growth granularity of every backing file.
    pub fn page_size(self, page_size: u64) -> Self {
        IndexerOptions { page_size, ..self }
    }

    pub(crate) fn index_options(&self, base_name: &str) -> ReverseIndexOptions {
        ReverseIndexOptions::from_base(self.directory.join(base_name))
            .clear_contents(self.clear_contents)
            .page_size(self.page_size)
    }
}

/// Options for an [`IdRemapper`](crate::remap::IdRemapper).
#[derive(Debug, Clone)]
pub struct RemapOptions {
    pub(crate) directory: PathBuf,
    pub(crate) clear_contents: bool,
    pub(crate) max_items_in_memory: usize,
    pub(crate) page_size: u64,
}

impl<P> From<P> for RemapOptions
where
    P: Into<PathBuf>,
{
    fn from(directory: P) -> Self {
        RemapOptions {
            directory: directory.into(),
            clear_contents: false,
            max_items_in_memory: DEFAULT_MAX_ITEMS_IN_MEMORY,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl RemapOptions {
    /// Forget previously assigned IDs.
    pub fn clear_contents(self, clear_contents: bool) -> Self {
        RemapOptions {
            clear_contents,
            ..self
        }
    }

    /// In-memory buffer size of each of the three maps.
    pub fn max_items_in_memory(self, max_items_in_memory: usize) -> Self {
        RemapOptions {
            max_items_in_memory,
            ..self
        }
    }

    /// Growth granularity of every backing file.
    pub fn page_size(self, page_size: u64) -> Self {
        RemapOptions { page_size, ..self }
    }

    pub(crate) fn map_options(&self, file_name: &str) -> MapOptions {
        MapOptions::from(self.directory.join(file_name))
            .clear_contents(self.clear_contents)
            .max_items_in_memory(self.max_items_in_memory)
            .page_size(self.page_size)
    }
}
