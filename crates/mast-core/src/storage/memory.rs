//! RAM backed [`FileMedium`] used by the simulator and tests.

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;

use super::{FileMedium, StoreError};

#[derive(Debug, Default)]
pub struct MemoryMedium {
    files: BTreeMap<String, Vec<u8>>,
    unavailable: bool,
}

impl MemoryMedium {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emulate pulling (`false`) or reinserting (`true`) the card.
    pub fn set_available(&mut self, available: bool) {
        self.unavailable = !available;
    }

    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    pub fn contents(&self, name: &str) -> Option<&[u8]> {
        self.files.get(name).map(Vec::as_slice)
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable {
            Err(StoreError::Unavailable)
        } else {
            Ok(())
        }
    }
}

impl FileMedium for MemoryMedium {
    fn size(&mut self, name: &str) -> Result<Option<u32>, StoreError> {
        self.check()?;
        Ok(self.files.get(name).map(|f| f.len() as u32))
    }

    fn read_at(&mut self, name: &str, offset: u32, buf: &mut [u8]) -> Result<usize, StoreError> {
        self.check()?;
        let Some(file) = self.files.get(name) else {
            return Ok(0);
        };

        let start = (offset as usize).min(file.len());
        let count = buf.len().min(file.len() - start);
        buf[..count].copy_from_slice(&file[start..start + count]);
        Ok(count)
    }

    fn append(&mut self, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.check()?;
        self.files
            .entry(name.to_string())
            .or_default()
            .extend_from_slice(bytes);
        Ok(())
    }

    fn replace(&mut self, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
        self.check()?;
        self.files.insert(name.to_string(), bytes.to_vec());
        Ok(())
    }

    fn remove(&mut self, name: &str) -> Result<(), StoreError> {
        self.check()?;
        self.files.remove(name);
        Ok(())
    }

    fn for_each_name(&mut self, f: &mut dyn FnMut(&str)) -> Result<(), StoreError> {
        self.check()?;
        self.files.keys().for_each(|name| f(name.as_str()));
        Ok(())
    }
}
