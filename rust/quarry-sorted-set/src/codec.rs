//! Partition file layout: a fixed-width `u64` element count followed by the
//! elements in ascending order, all bincode-encoded.

use std::{
    io::{Read, Write},
    marker::PhantomData,
};

use quarry_common::{Result, error::Error};
use serde::{Serialize, de::DeserializeOwned};

use crate::handler::SortedSetFileHandler;

fn binc_config() -> impl bincode::config::Config {
    bincode::config::standard().with_fixed_int_encoding()
}

pub(crate) fn write_partition<'a, E, I>(handler: &dyn SortedSetFileHandler, elements: I) -> Result<()>
where
    E: Serialize + 'a,
    I: ExactSizeIterator<Item = &'a E>,
{
    let encode_err = |e: bincode::error::EncodeError| {
        Error::storage(format!("failed to write partition {}: {e}", handler.name()))
    };
    let mut writer = handler.create_writer()?;
    bincode::serde::encode_into_std_write(elements.len() as u64, &mut writer, binc_config())
        .map_err(encode_err)?;
    for element in elements {
        bincode::serde::encode_into_std_write(element, &mut writer, binc_config())
            .map_err(encode_err)?;
    }
    writer
        .flush()
        .map_err(|e| Error::io(handler.name().to_string(), e))
}

/// Streams the elements of one partition in stored order.
pub(crate) struct PartitionReader<E> {
    name: String,
    reader: Box<dyn Read + Send>,
    remaining: u64,
    _marker: PhantomData<fn() -> E>,
}

impl<E: DeserializeOwned> PartitionReader<E> {
    pub(crate) fn open(handler: &dyn SortedSetFileHandler) -> Result<PartitionReader<E>> {
        let mut reader = handler.open_reader()?;
        let remaining: u64 = bincode::serde::decode_from_std_read(&mut reader, binc_config())
            .map_err(|e| {
                Error::storage(format!("failed to read partition {}: {e}", handler.name()))
            })?;
        Ok(PartitionReader {
            name: handler.name().to_string(),
            reader,
            remaining,
            _marker: PhantomData,
        })
    }

    /// Reads every element into memory.
    pub(crate) fn load(handler: &dyn SortedSetFileHandler) -> Result<Vec<E>> {
        Self::open(handler)?.collect()
    }
}

impl<E: DeserializeOwned> Iterator for PartitionReader<E> {
    type Item = Result<E>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let element = bincode::serde::decode_from_std_read(&mut self.reader, binc_config())
            .map_err(|e| Error::storage(format!("failed to read partition {}: {e}", self.name)));
        if element.is_err() {
            self.remaining = 0;
        }
        Some(element)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = usize::try_from(self.remaining).unwrap_or(usize::MAX);
        (0, Some(n))
    }
}
