//! Identifier sources behind the built-in `UUID` generator.
//!
//! A source lives for one execution; nothing here is shared between runs.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::GenerateError;

pub trait UuidSource {
    fn next_uuid(&mut self) -> Result<String, GenerateError>;
}

/// `urn:uuid:<v4>`; distinct per call, no cross-run stability.
#[derive(Debug, Default)]
pub struct RandomUuids;

impl UuidSource for RandomUuids {
    fn next_uuid(&mut self) -> Result<String, GenerateError> {
        Ok(format!("urn:uuid:{}", Uuid::new_v4()))
    }
}

/// `uuid:AAA`, `uuid:AAB`, ... for reproducible output in tests.
#[derive(Debug)]
pub struct SequentialUuids {
    width: usize,
    count: usize,
    max: usize,
}

impl SequentialUuids {
    pub fn new(width: usize) -> Self {
        let width = width.max(1);
        let max = u32::try_from(width)
            .ok()
            .and_then(|w| 26usize.checked_pow(w))
            .unwrap_or(usize::MAX);
        Self {
            width,
            count: 0,
            max,
        }
    }
}

impl UuidSource for SequentialUuids {
    fn next_uuid(&mut self) -> Result<String, GenerateError> {
        if self.count == self.max {
            return Err(GenerateError::UuidExhausted(self.count));
        }
        let mut c = self.count;
        self.count += 1;
        let mut letters = vec![b'A'; self.width];
        for slot in letters.iter_mut().rev() {
            *slot = b'A' + (c % 26) as u8;
            c /= 26;
        }
        Ok(format!("uuid:{}", String::from_utf8_lossy(&letters)))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UuidMode {
    #[default]
    Random,
    Sequential {
        width: usize,
    },
}

impl UuidMode {
    /// Fresh source for one execution.
    pub fn source(&self) -> Box<dyn UuidSource> {
        match *self {
            UuidMode::Random => Box::new(RandomUuids),
            UuidMode::Sequential { width } => Box::new(SequentialUuids::new(width)),
        }
    }
}
