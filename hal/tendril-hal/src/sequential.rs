//! Partition backed by sequential-storage
//!
//! Stores every namespace in one wear-levelled flash range using the
//! sequential-storage map. Values carry a one-byte header so a removed
//! entry (tombstone) stays distinguishable from a present empty value
//! without requiring multi-write flash. Each namespace keeps a directory
//! item listing its keys.

use core::ops::Range;

use embassy_futures::block_on;
use embedded_storage_async::nor_flash::NorFlash;
use heapless::Vec;
use sequential_storage::cache::NoCache;
use sequential_storage::map;

use crate::flash::{FlashError, Name, NvsKey, Partition, MAX_NAME_LEN, MAX_VALUE_SIZE};

/// Version written into fresh partitions
pub const FORMAT_VERSION: u8 = 1;

/// Maximum number of keys per namespace
pub const MAX_KEYS_PER_NAMESPACE: usize = 32;

/// Working buffer size (item header, key and value)
const DATA_BUFFER_SIZE: usize = MAX_VALUE_SIZE + 64;

/// Scratch size, large enough for a full directory or a value plus header
const SCRATCH_SIZE: usize = {
    let directory = MAX_KEYS_PER_NAMESPACE * (MAX_NAME_LEN + 1);
    if directory > MAX_VALUE_SIZE + 1 {
        directory
    } else {
        MAX_VALUE_SIZE + 1
    }
};

const LIVE: u8 = 1;
const TOMBSTONE: u8 = 0;

/// Partition over any async NOR flash
pub struct SequentialPartition<F> {
    flash: F,
    range: Range<u32>,
    buffer: [u8; DATA_BUFFER_SIZE],
    scratch: [u8; SCRATCH_SIZE],
}

impl<F: NorFlash> SequentialPartition<F> {
    /// Create a partition over `range` of `flash`
    pub fn new(flash: F, range: Range<u32>) -> Self {
        Self {
            flash,
            range,
            buffer: [0; DATA_BUFFER_SIZE],
            scratch: [0; SCRATCH_SIZE],
        }
    }

    /// Get the underlying flash for low-level access
    pub fn flash(&mut self) -> &mut F {
        &mut self.flash
    }

    fn directory(&mut self, namespace: &str) -> Result<Vec<Name, MAX_KEYS_PER_NAMESPACE>, FlashError> {
        let key = NvsKey::directory(namespace)?;
        fetch_item(&mut self.flash, self.range.clone(), &mut self.buffer, &key, |value| {
            let mut names = Vec::new();
            for part in value.unwrap_or(&[]).split(|byte| *byte == 0) {
                if part.is_empty() {
                    continue;
                }
                let text = core::str::from_utf8(part).map_err(|_| FlashError::Corrupted)?;
                let name = Name::try_from(text).map_err(|_| FlashError::Corrupted)?;
                names.push(name).map_err(|_| FlashError::Corrupted)?;
            }
            Ok(names)
        })?
    }

    fn store_directory(&mut self, namespace: &str, names: &[Name]) -> Result<(), FlashError> {
        let mut len = 0;
        for name in names {
            let bytes = name.as_bytes();
            self.scratch[len..len + bytes.len()].copy_from_slice(bytes);
            len += bytes.len();
            self.scratch[len] = 0;
            len += 1;
        }
        let key = NvsKey::directory(namespace)?;
        store_item(
            &mut self.flash,
            self.range.clone(),
            &mut self.buffer,
            &key,
            &self.scratch[..len],
        )
    }

    fn is_live(&mut self, key: &NvsKey) -> Result<bool, FlashError> {
        fetch_item(&mut self.flash, self.range.clone(), &mut self.buffer, key, |value| {
            matches!(value, Some([LIVE, ..]))
        })
    }
}

impl<F: NorFlash> Partition for SequentialPartition<F> {
    fn init(&mut self) -> Result<(), FlashError> {
        let version = fetch_item(
            &mut self.flash,
            self.range.clone(),
            &mut self.buffer,
            &NvsKey::FormatVersion,
            |value| value.map(|bytes| bytes.first().copied()),
        )
        // An unreadable map is treated like a partition without free pages
        .map_err(|_| FlashError::Truncated)?;

        match version {
            Some(Some(FORMAT_VERSION)) => Ok(()),
            Some(_) => Err(FlashError::NewVersion),
            None => store_item(
                &mut self.flash,
                self.range.clone(),
                &mut self.buffer,
                &NvsKey::FormatVersion,
                &[FORMAT_VERSION],
            ),
        }
    }

    fn erase(&mut self) -> Result<(), FlashError> {
        block_on(self.flash.erase(self.range.start, self.range.end)).map_err(|_| FlashError::Flash)
    }

    fn read(
        &mut self,
        namespace: &str,
        key: &str,
        buffer: &mut [u8],
    ) -> Result<Option<usize>, FlashError> {
        let key = NvsKey::entry(namespace, key)?;
        fetch_item(&mut self.flash, self.range.clone(), &mut self.buffer, &key, |value| {
            match value {
                None | Some([TOMBSTONE, ..]) => Ok(None),
                Some([LIVE, data @ ..]) => {
                    if buffer.len() < data.len() {
                        return Err(FlashError::BufferTooSmall);
                    }
                    buffer[..data.len()].copy_from_slice(data);
                    Ok(Some(data.len()))
                }
                Some(_) => Err(FlashError::Corrupted),
            }
        })?
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), FlashError> {
        if data.len() > MAX_VALUE_SIZE {
            return Err(FlashError::ValueTooLarge);
        }
        let item_key = NvsKey::entry(namespace, key)?;
        let mut names = self.directory(namespace)?;
        let name = crate::flash::name(key)?;
        if !names.contains(&name) {
            names.push(name).map_err(|_| FlashError::Full)?;
            self.store_directory(namespace, &names)?;
        }

        self.scratch[0] = LIVE;
        self.scratch[1..=data.len()].copy_from_slice(data);
        store_item(
            &mut self.flash,
            self.range.clone(),
            &mut self.buffer,
            &item_key,
            &self.scratch[..=data.len()],
        )
    }

    fn remove(&mut self, namespace: &str, key: &str) -> Result<bool, FlashError> {
        let item_key = NvsKey::entry(namespace, key)?;
        if !self.is_live(&item_key)? {
            return Ok(false);
        }
        store_item(
            &mut self.flash,
            self.range.clone(),
            &mut self.buffer,
            &item_key,
            &[TOMBSTONE],
        )?;

        let mut names = self.directory(namespace)?;
        names.retain(|name| name.as_str() != key);
        self.store_directory(namespace, &names)?;
        Ok(true)
    }

    fn for_each_key(
        &mut self,
        namespace: &str,
        visit: &mut dyn FnMut(&str),
    ) -> Result<(), FlashError> {
        for name in self.directory(namespace)? {
            visit(name.as_str());
        }
        Ok(())
    }

    fn erase_namespace(&mut self, namespace: &str) -> Result<(), FlashError> {
        let names = self.directory(namespace)?;
        for name in &names {
            let item_key = NvsKey::entry(namespace, name.as_str())?;
            store_item(
                &mut self.flash,
                self.range.clone(),
                &mut self.buffer,
                &item_key,
                &[TOMBSTONE],
            )?;
        }
        self.store_directory(namespace, &[])
    }
}

fn fetch_item<F: NorFlash, R>(
    flash: &mut F,
    range: Range<u32>,
    buffer: &mut [u8],
    key: &NvsKey,
    read: impl FnOnce(Option<&[u8]>) -> R,
) -> Result<R, FlashError> {
    let value = block_on(map::fetch_item::<NvsKey, &[u8], _>(
        flash,
        range,
        &mut NoCache::new(),
        buffer,
        key,
    ))
    .map_err(|_| FlashError::Storage)?;
    Ok(read(value))
}

fn store_item<F: NorFlash>(
    flash: &mut F,
    range: Range<u32>,
    buffer: &mut [u8],
    key: &NvsKey,
    value: &[u8],
) -> Result<(), FlashError> {
    block_on(map::store_item(
        flash,
        range,
        &mut NoCache::new(),
        buffer,
        key,
        &value,
    ))
    .map_err(|_| FlashError::Storage)
}
