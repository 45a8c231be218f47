//! Non-volatile storage abstractions
//!
//! A partition holds opaque byte blobs addressed by a (namespace, key)
//! pair. Namespaces isolate unrelated subsystems: erasing one never
//! touches the entries of another.

use heapless::String;

/// Maximum length of a namespace or key name in bytes
pub const MAX_NAME_LEN: usize = 15;

/// A namespace or key name
pub type Name = String<MAX_NAME_LEN>;

/// Largest value a partition stores, in bytes
pub const MAX_VALUE_SIZE: usize = 2048;

/// Errors from partition operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashError {
    /// Flash operation failed
    Flash,
    /// Storage operation failed
    Storage,
    /// Buffer too small for the data
    BufferTooSmall,
    /// Data corrupted or invalid
    Corrupted,
    /// Storage is full
    Full,
    /// Partition has no free pages left and must be erased
    Truncated,
    /// Partition was written by an incompatible format version
    NewVersion,
    /// Namespace or key name longer than [`MAX_NAME_LEN`]
    NameTooLong,
    /// Value longer than [`MAX_VALUE_SIZE`]
    ValueTooLarge,
}

impl FlashError {
    /// Whether erasing the partition and initialising again can recover
    pub fn is_recoverable_by_erase(self) -> bool {
        matches!(self, FlashError::Truncated | FlashError::NewVersion)
    }
}

/// Build a [`Name`] from a string slice
pub fn name(value: &str) -> Result<Name, FlashError> {
    Name::try_from(value).map_err(|_| FlashError::NameTooLong)
}

/// Namespaced key-value partition
///
/// Every mutating operation must be committed before it returns `Ok`.
/// A failed write leaves the previous value readable.
pub trait Partition {
    /// Prepare the partition for use
    ///
    /// Returns [`FlashError::Truncated`] or [`FlashError::NewVersion`] when
    /// the partition needs to be erased before it can be used.
    fn init(&mut self) -> Result<(), FlashError>;

    /// Erase the whole partition, every namespace included
    fn erase(&mut self) -> Result<(), FlashError>;

    /// Read a value into `buffer`
    ///
    /// Returns `Ok(None)` when the key is absent, otherwise the number of
    /// bytes read. A present value may be empty.
    fn read(
        &mut self,
        namespace: &str,
        key: &str,
        buffer: &mut [u8],
    ) -> Result<Option<usize>, FlashError>;

    /// Write a value, replacing any previous one
    ///
    /// Values longer than [`MAX_VALUE_SIZE`] are rejected with
    /// [`FlashError::ValueTooLarge`].
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), FlashError>;

    /// Remove a value, returning whether it existed
    fn remove(&mut self, namespace: &str, key: &str) -> Result<bool, FlashError>;

    /// Visit every key stored in a namespace
    fn for_each_key(
        &mut self,
        namespace: &str,
        visit: &mut dyn FnMut(&str),
    ) -> Result<(), FlashError>;

    /// Remove every entry of a namespace
    fn erase_namespace(&mut self, namespace: &str) -> Result<(), FlashError>;
}

/// Flash-level key identifying a partition item
///
/// Besides the entries themselves a partition keeps one directory item
/// per namespace (listing its keys) and a single format version item.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NvsKey {
    /// Partition format version marker
    FormatVersion,
    /// Key listing of a namespace
    Directory { namespace: Name },
    /// A stored value
    Entry { namespace: Name, key: Name },
}

impl NvsKey {
    /// Key of a stored value
    pub fn entry(namespace: &str, key: &str) -> Result<Self, FlashError> {
        Ok(NvsKey::Entry {
            namespace: name(namespace)?,
            key: name(key)?,
        })
    }

    /// Key of a namespace's directory
    pub fn directory(namespace: &str) -> Result<Self, FlashError> {
        Ok(NvsKey::Directory {
            namespace: name(namespace)?,
        })
    }

    /// Leading byte of the serialized key
    pub fn tag(&self) -> u8 {
        match self {
            NvsKey::FormatVersion => 0,
            NvsKey::Directory { .. } => 1,
            NvsKey::Entry { .. } => 2,
        }
    }
}

#[cfg(feature = "sequential-storage")]
mod key_codec {
    use super::{Name, NvsKey};
    use sequential_storage::map::{Key, SerializationError};

    fn put_name(
        buffer: &mut [u8],
        position: usize,
        name: &Name,
    ) -> Result<usize, SerializationError> {
        let bytes = name.as_bytes();
        let end = position + 1 + bytes.len();
        if buffer.len() < end {
            return Err(SerializationError::BufferTooSmall);
        }
        buffer[position] = bytes.len() as u8;
        buffer[position + 1..end].copy_from_slice(bytes);
        Ok(end)
    }

    fn take_name(buffer: &[u8], position: usize) -> Result<(Name, usize), SerializationError> {
        let len = *buffer
            .get(position)
            .ok_or(SerializationError::BufferTooSmall)? as usize;
        let end = position + 1 + len;
        let bytes = buffer
            .get(position + 1..end)
            .ok_or(SerializationError::BufferTooSmall)?;
        let text = core::str::from_utf8(bytes).map_err(|_| SerializationError::InvalidFormat)?;
        let name = Name::try_from(text).map_err(|_| SerializationError::InvalidFormat)?;
        Ok((name, end))
    }

    impl Key for NvsKey {
        fn serialize_into(&self, buffer: &mut [u8]) -> Result<usize, SerializationError> {
            if buffer.is_empty() {
                return Err(SerializationError::BufferTooSmall);
            }
            buffer[0] = self.tag();
            match self {
                NvsKey::FormatVersion => Ok(1),
                NvsKey::Directory { namespace } => put_name(buffer, 1, namespace),
                NvsKey::Entry { namespace, key } => {
                    let position = put_name(buffer, 1, namespace)?;
                    put_name(buffer, position, key)
                }
            }
        }

        fn deserialize_from(buffer: &[u8]) -> Result<(Self, usize), SerializationError> {
            match buffer.first() {
                None => Err(SerializationError::BufferTooSmall),
                Some(0) => Ok((NvsKey::FormatVersion, 1)),
                Some(1) => {
                    let (namespace, end) = take_name(buffer, 1)?;
                    Ok((NvsKey::Directory { namespace }, end))
                }
                Some(2) => {
                    let (namespace, position) = take_name(buffer, 1)?;
                    let (key, end) = take_name(buffer, position)?;
                    Ok((NvsKey::Entry { namespace, key }, end))
                }
                Some(_) => Err(SerializationError::InvalidFormat),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_length_limit() {
        assert!(name("network-config").is_ok());
        assert_eq!(
            name("a-key-that-is-far-too-long"),
            Err(FlashError::NameTooLong)
        );
    }

    #[test]
    fn test_recoverable_errors() {
        assert!(FlashError::Truncated.is_recoverable_by_erase());
        assert!(FlashError::NewVersion.is_recoverable_by_erase());
        assert!(!FlashError::Corrupted.is_recoverable_by_erase());
        assert!(!FlashError::Flash.is_recoverable_by_erase());
    }

    #[test]
    fn test_key_tags_are_distinct() {
        let version = NvsKey::FormatVersion;
        let directory = NvsKey::directory("config").unwrap();
        let entry = NvsKey::entry("config", "device-config").unwrap();
        assert_ne!(version.tag(), directory.tag());
        assert_ne!(directory.tag(), entry.tag());
    }

    proptest::proptest! {
        #[test]
        fn test_short_names_accepted(value in "[a-z0-9-]{0,15}") {
            let parsed = name(&value).unwrap();
            proptest::prop_assert_eq!(parsed.as_str(), value.as_str());
        }
    }

    #[cfg(feature = "sequential-storage")]
    #[test]
    fn test_key_codec() {
        use sequential_storage::map::Key;

        let key = NvsKey::entry("perf-state", "valve").unwrap();
        let mut buffer = [0u8; 40];
        let len = key.serialize_into(&mut buffer).unwrap();
        let (decoded, used) = NvsKey::deserialize_from(&buffer[..len]).unwrap();
        assert_eq!(decoded, key);
        assert_eq!(used, len);
    }
}
