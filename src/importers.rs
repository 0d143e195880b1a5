// ! Historical archive downloads for the stdmet importer

pub mod downloader;

// Re-export commonly used items
pub use downloader::{ArchiveDownloader, StationFile, DEFAULT_ARCHIVE_BASE_URL};
