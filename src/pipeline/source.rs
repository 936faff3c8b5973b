//! Local pipeline stages a producer port can drive.

use crate::error::{PortError, Result};
use crate::types::{DataKind, DataObject, Extent, LogicalClock, OutputDescriptor, TimeStamp};
use std::sync::{Arc, Mutex, MutexGuard};

/// Values generated per piece for unstructured kinds.
pub const POINTS_PER_PIECE: usize = 8;

/// A pipeline stage as seen from the port that serves it.
#[cfg_attr(test, mockall::automock)]
pub trait PipelineSource {
    /// Metadata propagation: bring the descriptor up to date without executing.
    fn update_information(&mut self) -> Result<(DataKind, OutputDescriptor)>;

    /// Execute for `extent` and return a copy of the output.
    fn update_data(&mut self, extent: Extent) -> Result<DataObject>;
}

#[derive(Debug)]
struct GeneratorState {
    kind: DataKind,
    whole_extent: Extent,
    scale: f64,
    modified: TimeStamp,
    output: DataObject,
    executions: u64,
}

/// Stage that fills its output with `scale * index` for every point.
///
/// Clones share the same state, so a test or an embedding application can
/// keep a handle and modify the stage while a producer port owns it.
#[derive(Debug, Clone)]
pub struct GeneratorSource {
    state: Arc<Mutex<GeneratorState>>,
    clock: LogicalClock,
}

impl GeneratorSource {
    pub fn new(kind: DataKind, whole_extent: Extent, clock: LogicalClock) -> Self {
        let modified = clock.tick();
        Self {
            state: Arc::new(Mutex::new(GeneratorState {
                kind,
                whole_extent,
                scale: 1.0,
                modified,
                output: DataObject::new(kind),
                executions: 0,
            })),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, GeneratorState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Change the generated values; the stage is modified.
    pub fn set_scale(&self, scale: f64) {
        let mut state = self.lock();
        if state.scale != scale {
            state.scale = scale;
            state.modified = self.clock.tick();
        }
    }

    /// Switch the kind of data emitted; the stage is modified.
    pub fn set_kind(&self, kind: DataKind) {
        let mut state = self.lock();
        if state.kind != kind {
            state.kind = kind;
            state.whole_extent = match (kind.is_structured(), state.whole_extent) {
                (true, e @ Extent::Structured(_)) | (false, e @ Extent::Piece { .. }) => e,
                _ => kind.empty_extent(),
            };
            state.output = DataObject::new(kind);
            state.modified = self.clock.tick();
        }
    }

    /// Free the generated output to save memory.
    pub fn release_data(&self) {
        self.lock().output.release_data();
    }

    pub fn modified_time(&self) -> TimeStamp {
        self.lock().modified
    }

    /// How many times the stage actually executed.
    pub fn executions(&self) -> u64 {
        self.lock().executions
    }

    fn point_count(kind: DataKind, extent: &Extent, whole: &Extent) -> Result<usize> {
        match extent {
            Extent::Unset => Ok(match whole {
                Extent::Structured(_) => whole.point_count().unwrap_or(0),
                _ => POINTS_PER_PIECE,
            }),
            Extent::Structured(_) if kind.is_structured() => {
                if !whole.contains(extent) {
                    return Err(PortError::Source(format!(
                        "requested extent {:?} outside whole extent {:?}",
                        extent, whole
                    )));
                }
                Ok(extent.point_count().unwrap_or(0))
            }
            Extent::Piece {
                piece, num_pieces, ..
            } if !kind.is_structured() => {
                if *num_pieces == 0 || piece >= num_pieces {
                    return Err(PortError::Source(format!(
                        "invalid piece {} of {}",
                        piece, num_pieces
                    )));
                }
                Ok(POINTS_PER_PIECE)
            }
            _ => Err(PortError::Source(format!(
                "extent {:?} does not address {} output",
                extent, kind
            ))),
        }
    }
}

impl PipelineSource for GeneratorSource {
    fn update_information(&mut self) -> Result<(DataKind, OutputDescriptor)> {
        let state = self.lock();
        let descriptor = OutputDescriptor {
            extent: state.whole_extent,
            validity_time: state.modified,
            locality: 1.0,
            released: state.output.is_released(),
        };
        Ok((state.kind, descriptor))
    }

    fn update_data(&mut self, extent: Extent) -> Result<DataObject> {
        let mut state = self.lock();
        let count = Self::point_count(state.kind, &extent, &state.whole_extent)?;
        let scale = state.scale;
        let values = (0..count).map(|i| scale * i as f64).collect();

        let whole_extent = state.whole_extent;
        let modified = state.modified;
        let output = &mut state.output;
        output.set_update_extent(extent);
        output.set_descriptor(OutputDescriptor {
            extent: whole_extent,
            validity_time: modified,
            locality: 1.0,
            released: false,
        });
        output.set_scalars(values);
        let copy = output.clone();

        state.executions += 1;
        tracing::debug!(
            "Generator executed #{} for {:?} ({} values, time {})",
            state.executions,
            extent,
            count,
            modified
        );
        Ok(copy)
    }
}
