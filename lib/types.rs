//! Useful types used across multiple modules.

use serde::{Deserialize, Serialize};

/// The underlying endianness of the analysed program's memory.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Endian {
    Big,
    Little,
}

/// The machine the analysed program targets.
///
/// Shape graphs only need it to size pointer fields and to tell which byte of
/// a multi-byte field is the most significant one.
#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub struct MachineModel {
    endian: Endian,
    word_size: usize,
}

impl MachineModel {
    /// Create a new machine model. `word_size` is given in bits.
    pub fn new(endian: Endian, word_size: usize) -> MachineModel {
        MachineModel { endian, word_size }
    }

    /// 32-bit little endian Linux.
    pub fn linux32() -> MachineModel {
        MachineModel::new(Endian::Little, 32)
    }

    /// 64-bit little endian Linux.
    pub fn linux64() -> MachineModel {
        MachineModel::new(Endian::Little, 64)
    }

    /// Get the endianness of this machine.
    pub fn endian(&self) -> Endian {
        self.endian
    }

    /// Get the natural word size of this machine in bits.
    pub fn word_size(&self) -> usize {
        self.word_size
    }

    /// Get the size of a pointer in bytes.
    pub fn pointer_size(&self) -> u64 {
        (self.word_size / 8) as u64
    }
}

impl Default for MachineModel {
    fn default() -> MachineModel {
        MachineModel::linux64()
    }
}

#[test]
fn test_linux32() {
    let model = MachineModel::linux32();
    assert_eq!(model.endian(), Endian::Little);
    assert_eq!(model.word_size(), 32);
    assert_eq!(model.pointer_size(), 4);
}

#[test]
fn test_linux64() {
    let model = MachineModel::default();
    assert_eq!(model.endian(), Endian::Little);
    assert_eq!(model.pointer_size(), 8);
}
