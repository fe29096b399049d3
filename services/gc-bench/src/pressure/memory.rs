//! Memory pressure: retained and transient word-sized buffers

use std::{hint::black_box, mem::size_of};
use tracing::debug;

use crate::error::ExhaustionError;

/// Size in bytes of `elements` word-sized slots, saturating on overflow
#[must_use]
pub const fn element_bytes(elements: usize) -> usize {
    elements.saturating_mul(size_of::<usize>())
}

/// Zero-filled buffer of `elements` slots, or an error instead of an abort
/// when the allocator refuses the request.
fn allocate_slots(elements: usize) -> Result<Vec<usize>, ExhaustionError> {
    let mut slots = Vec::new();
    slots
        .try_reserve_exact(elements)
        .map_err(|_| ExhaustionError {
            elements,
            bytes: element_bytes(elements),
        })?;
    // Writing every slot commits the pages; untouched capacity would not
    // show up as resident memory.
    slots.resize(elements, 0);
    Ok(slots)
}

/// Long-lived block that establishes a fixed live-heap baseline
///
/// Allocated once at startup and held by the server context until the
/// process exits. Never mutated after creation.
pub struct RetainedBuffer {
    slots: Box<[usize]>,
}

impl std::fmt::Debug for RetainedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetainedBuffer")
            .field("elements", &self.slots.len())
            .field("bytes", &self.size_bytes())
            .finish()
    }
}

impl RetainedBuffer {
    pub fn allocate(elements: usize) -> Result<Self, ExhaustionError> {
        let slots = allocate_slots(elements)?.into_boxed_slice();
        debug!(
            "Retained buffer allocated: {} elements, {} bytes",
            elements,
            element_bytes(elements)
        );
        Ok(Self { slots })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[must_use]
    pub fn size_bytes(&self) -> usize {
        element_bytes(self.slots.len())
    }
}

/// Allocate a transient buffer, keep it observable until the end of the call,
/// then let it drop. Returns the number of bytes churned.
pub fn churn(elements: usize) -> Result<usize, ExhaustionError> {
    let slots = allocate_slots(elements)?;
    black_box(&slots);
    Ok(element_bytes(slots.len()))
}
