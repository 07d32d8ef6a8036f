/// Generational handle: a slot index plus the generation the slot had when the
/// handle was issued. A handle whose generation no longer matches is stale.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle {
    index: u32,
    generation: u32,
}

impl Handle {
    pub fn new(index: u32, generation: u32) -> Self {
        Handle { index, generation }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Packs the handle into a single integer, suitable for embedding in
    /// externally rendered content (element ids, data attributes).
    pub fn to_bits(self) -> u64 {
        ((self.generation as u64) << 32) | self.index as u64
    }

    pub fn from_bits(bits: u64) -> Self {
        Handle {
            index: bits as u32,
            generation: (bits >> 32) as u32,
        }
    }
}

impl std::fmt::Display for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

#[cfg(test)]
mod tests {
    use super::Handle;

    #[test]
    fn bits_preserve_index_and_generation() {
        let h = Handle::new(7, 3);
        let back = Handle::from_bits(h.to_bits());
        assert_eq!(back, h);
        assert_eq!(back.index(), 7);
        assert_eq!(back.generation(), 3);
    }
}
