//! The filesystem-backed [`BlobSource`]: names
//! resolve either straight off disk under a configured root, or through a
//! loaded [`AarArchive`] first, falling back to disk for names the archive
//! doesn't have. Useful for patch/override directories layered over a base
//! archive.

use std::fs;
use std::path::PathBuf;

use crate::error::Result;
use crate::formats::aar::AarArchive;
use crate::formats::qnt;
use crate::image::Image;
use crate::io::BlobSource;

pub struct LoaderConfig {
    pub root: PathBuf,
    pub archive: Option<PathBuf>,
}

pub struct FsBlobSource {
    root: PathBuf,
    archive_buf: Option<Vec<u8>>,
}

impl FsBlobSource {
    pub fn new(config: LoaderConfig) -> Result<FsBlobSource> {
        let archive_buf = match config.archive {
            Some(path) => Some(fs::read(path)?),
            None => None,
        };
        Ok(FsBlobSource { root: config.root, archive_buf })
    }

    fn archive(&self) -> Result<Option<AarArchive>> {
        self.archive_buf.as_deref().map(AarArchive::open).transpose()
    }

    fn resolve_path(&self, name: &str) -> PathBuf {
        let normalized = name.replace('\\', std::path::MAIN_SEPARATOR_STR);
        self.root.join(normalized)
    }
}

impl BlobSource for FsBlobSource {
    fn exists(&self, name: &str) -> bool {
        if let Ok(Some(archive)) = self.archive() {
            if archive.exists(name) {
                return true;
            }
        }
        self.resolve_path(name).is_file()
    }

    fn filenames(&self) -> Vec<String> {
        match self.archive() {
            Ok(Some(archive)) => archive.filenames().to_vec(),
            _ => Vec::new(),
        }
    }

    fn load(&self, name: &str) -> Result<Vec<u8>> {
        if let Some(archive) = self.archive()? {
            if archive.exists(name) {
                return archive.load(name);
            }
        }
        Ok(fs::read(self.resolve_path(name))?)
    }

    fn load_image(&self, name: &str) -> Result<Image> {
        let bytes = self.load(name)?;
        qnt::decode(&bytes)
    }

    fn load_image_list(&self, base: &str) -> Result<Vec<Image>> {
        let single = format!("{}.qnt", base);
        let first_frame = format!("{}_00.qnt", base);

        if self.exists(&single) && !self.exists(&first_frame) {
            return Ok(vec![self.load_image(&single)?]);
        }

        let mut frames = Vec::new();
        let mut i = 0u32;
        loop {
            let name = format!("{}_{:02}.qnt", base, i);
            if !self.exists(&name) {
                break;
            }
            frames.push(self.load_image(&name)?);
            i += 1;
        }
        if frames.is_empty() && self.exists(&single) {
            frames.push(self.load_image(&single)?);
        }
        Ok(frames)
    }
}
