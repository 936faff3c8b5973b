//! Core data types for pipeport
//!
//! # Main Types
//!
//! - [`ProcessId`] / [`Tag`] - Addressing for the process channel
//! - [`TimeStamp`] / [`LogicalClock`] - Logical modification times, the only
//!   staleness signal used by the ports
//! - [`DataKind`] - Closed set of output kinds a stage can emit
//! - [`Extent`] - Region of an output (index ranges or an unstructured piece)
//! - [`OutputDescriptor`] - Metadata record describing a stage's output
//! - [`DataObject`] - An output: kind, descriptor, requested extent and payload
//!
//! # Ownership
//!
//! Every type here is a plain value. Descriptors and data objects are copied
//! across the process boundary, never shared by reference, so a consumer
//! editing its own descriptor can never disturb the producer's.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Identity of a cooperating process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProcessId(pub u32);

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Integer tag naming a message stream or a remote handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag(pub i32);

impl Tag {
    /// Tag offset by `n`, used to derive the data-phase handler from the base tag.
    ///
    /// `None` when the result does not fit in an `i32`.
    #[inline]
    pub fn offset(self, n: i32) -> Option<Tag> {
        self.0.checked_add(n).map(Tag)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Logical modification time.
///
/// Zero means "never computed"; every real modification is strictly positive.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct TimeStamp(pub u64);

impl TimeStamp {
    pub const ZERO: TimeStamp = TimeStamp(0);
}

impl fmt::Display for TimeStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-process Lamport clock.
///
/// Cloning yields another handle onto the same counter. Times learned from a
/// remote process are folded in with [`LogicalClock::witness`], so the next
/// local tick is always later than anything observed.
#[derive(Debug, Clone, Default)]
pub struct LogicalClock {
    counter: Arc<AtomicU64>,
}

impl LogicalClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the clock and return the new time.
    pub fn tick(&self) -> TimeStamp {
        TimeStamp(self.counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Current time without advancing.
    pub fn now(&self) -> TimeStamp {
        TimeStamp(self.counter.load(Ordering::SeqCst))
    }

    /// Fold in a time observed elsewhere.
    pub fn witness(&self, seen: TimeStamp) {
        self.counter.fetch_max(seen.0, Ordering::SeqCst);
    }
}

/// The kind of data an output carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataKind {
    PolyData,
    UnstructuredGrid,
    StructuredGrid,
    RectilinearGrid,
    StructuredPoints,
    ImageData,
}

impl DataKind {
    pub const ALL: [DataKind; 6] = [
        DataKind::PolyData,
        DataKind::UnstructuredGrid,
        DataKind::StructuredGrid,
        DataKind::RectilinearGrid,
        DataKind::StructuredPoints,
        DataKind::ImageData,
    ];

    /// Structured kinds are addressed by index ranges, the others by pieces.
    pub fn is_structured(self) -> bool {
        !matches!(self, DataKind::PolyData | DataKind::UnstructuredGrid)
    }

    /// The empty extent matching this kind's addressing style.
    pub fn empty_extent(self) -> Extent {
        if self.is_structured() {
            Extent::Structured([0, -1, 0, -1, 0, -1])
        } else {
            Extent::Piece {
                piece: 0,
                num_pieces: 1,
                ghost_level: 0,
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DataKind::PolyData => "PolyData",
            DataKind::UnstructuredGrid => "UnstructuredGrid",
            DataKind::StructuredGrid => "StructuredGrid",
            DataKind::RectilinearGrid => "RectilinearGrid",
            DataKind::StructuredPoints => "StructuredPoints",
            DataKind::ImageData => "ImageData",
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Region of an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Extent {
    /// Nothing requested yet; producers treat this as "everything".
    #[default]
    Unset,
    /// Inclusive index ranges `[xmin, xmax, ymin, ymax, zmin, zmax]`.
    Structured([i32; 6]),
    /// One piece out of `num_pieces`, with `ghost_level` layers of ghost cells.
    Piece {
        piece: u32,
        num_pieces: u32,
        ghost_level: u32,
    },
}

impl Extent {
    /// Number of points covered by a structured extent. Empty axes give zero.
    ///
    /// `None` for non-structured extents and for counts that overflow `usize`.
    pub fn point_count(&self) -> Option<usize> {
        match self {
            Extent::Structured(e) => {
                let mut count = 1usize;
                for axis in 0..3 {
                    let span = i64::from(e[2 * axis + 1]) - i64::from(e[2 * axis]) + 1;
                    if span <= 0 {
                        return Some(0);
                    }
                    count = count.checked_mul(usize::try_from(span).ok()?)?;
                }
                Some(count)
            }
            _ => None,
        }
    }

    /// Whether `other` lies entirely inside this extent.
    ///
    /// Pieces only contain themselves; `Unset` contains everything.
    pub fn contains(&self, other: &Extent) -> bool {
        match (self, other) {
            (Extent::Unset, _) => true,
            (Extent::Structured(outer), Extent::Structured(inner)) => (0..3).all(|axis| {
                inner[2 * axis] >= outer[2 * axis] && inner[2 * axis + 1] <= outer[2 * axis + 1]
            }),
            (a, b) => a == b,
        }
    }
}

/// Metadata record describing a stage's output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputDescriptor {
    /// Region described. Producers report the largest extent they can produce.
    pub extent: Extent,
    /// When the described output was last (re)computed.
    pub validity_time: TimeStamp,
    /// 1.0 when the bytes are resident locally, 0.0 when proxied.
    pub locality: f64,
    /// True once the underlying storage has been freed.
    pub released: bool,
}

impl OutputDescriptor {
    pub fn new(extent: Extent) -> Self {
        Self {
            extent,
            validity_time: TimeStamp::ZERO,
            locality: 1.0,
            released: true,
        }
    }
}

/// A stage output: kind, descriptor, the extent currently requested and the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataObject {
    kind: DataKind,
    descriptor: OutputDescriptor,
    update_extent: Extent,
    scalars: Option<Vec<f64>>,
}

impl DataObject {
    /// A new, empty output of `kind`. It starts released.
    pub fn new(kind: DataKind) -> Self {
        Self {
            kind,
            descriptor: OutputDescriptor::new(kind.empty_extent()),
            update_extent: Extent::Unset,
            scalars: None,
        }
    }

    pub fn kind(&self) -> DataKind {
        self.kind
    }

    pub fn descriptor(&self) -> &OutputDescriptor {
        &self.descriptor
    }

    pub fn descriptor_mut(&mut self) -> &mut OutputDescriptor {
        &mut self.descriptor
    }

    /// Replace the descriptor wholesale with a copy.
    pub fn set_descriptor(&mut self, descriptor: OutputDescriptor) {
        self.descriptor = descriptor;
    }

    pub fn update_extent(&self) -> Extent {
        self.update_extent
    }

    pub fn set_update_extent(&mut self, extent: Extent) {
        if self.update_extent != extent {
            self.update_extent = extent;
            // A new request invalidates whatever we hold.
            self.release_data();
        }
    }

    pub fn scalars(&self) -> Option<&[f64]> {
        self.scalars.as_deref()
    }

    /// Install payload values; the output is no longer released.
    pub fn set_scalars(&mut self, values: Vec<f64>) {
        self.scalars = Some(values);
        self.descriptor.released = false;
    }

    /// Free the payload to save memory.
    pub fn release_data(&mut self) {
        self.scalars = None;
        self.descriptor.released = true;
    }

    pub fn is_released(&self) -> bool {
        self.descriptor.released || self.scalars.is_none()
    }

    /// Move the payload out of `other` into this object, keeping our descriptor.
    ///
    /// An empty `other` releases this object but leaves its requested extent alone.
    pub(crate) fn take_payload_from(&mut self, other: DataObject) {
        match other.scalars {
            Some(values) => {
                self.update_extent = other.update_extent;
                self.set_scalars(values);
            }
            None => self.release_data(),
        }
    }
}
